use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;

use crate::bus::{Channel, Publication, Topics};
use crate::command::{Command, Priority};
use crate::decode::AppDecodeLevel;
use crate::dispatch::DispatchTable;
use crate::error::{CommandParseError, InvalidRequest};
use crate::ingress::BusCommand;
use crate::scheduler::Scheduler;
use crate::weighment::{Outcome, Report, WeighmentSession};

/// Identification strings read from the controller at startup
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Firmware {
    /// firmware version, once read
    pub version: Option<String>,
    /// firmware release date, once read
    pub release_date: Option<String>,
}

impl Firmware {
    fn is_known(&self) -> bool {
        self.version.is_some() && self.release_date.is_some()
    }
}

/// Everything shared between bus ingress, the transport and the monitor
///
/// Lock order: this state is locked before the scheduler, never after.
pub(crate) struct EngineState {
    pub(crate) session: WeighmentSession,
    pub(crate) status_mode: bool,
    pub(crate) status_control: bool,
    pub(crate) firmware: Firmware,
    monitoring: bool,
    polling: bool,
    comm_failure: bool,
    epoch: u64,
    scheduler: Scheduler,
    topics: Topics,
    egress: UnboundedSender<Publication>,
}

impl EngineState {
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    fn enqueue(&self, command: Command) -> bool {
        tracing::debug!("queue {} ({:?})", command, command.priority());
        self.scheduler.enqueue(command.with_epoch(self.epoch))
    }

    fn clear_queue(&self) {
        let count = self.scheduler.clear();
        if count > 0 {
            tracing::info!("discarded {} queued commands", count);
        }
    }

    fn reset_session(&mut self) {
        self.session = WeighmentSession::new();
        self.epoch += 1;
        self.status_mode = false;
        self.status_control = false;
        self.comm_failure = false;
    }

    /// publish a message unless the communication failure latch is set
    pub(crate) fn publish<T: Serialize>(&self, channel: Channel, value: &T) {
        if self.comm_failure && channel != Channel::ErrorStatus {
            tracing::debug!("{} suppressed while the link is down", channel);
            return;
        }

        let payload = match serde_json::to_string(value) {
            Ok(x) => x,
            Err(err) => {
                tracing::error!("unable to serialize {} message: {}", channel, err);
                return;
            }
        };

        let publication = Publication {
            channel,
            topic: self.topics.egress(channel),
            payload,
        };

        if self.egress.send(publication).is_err() {
            tracing::warn!("{} message dropped, egress closed", channel);
        }
    }

    pub(crate) fn apply_outcome(&mut self, outcome: Outcome) {
        for report in &outcome.reports {
            match report {
                Report::Wagon(x) => self.publish(Channel::Weighment, x),
                Report::Telemetry(x) => self.publish(Channel::Weighment, x),
                Report::DefaultWeight(x) => self.publish(Channel::WeightStatus, x),
            }
        }

        if outcome.clear_queue {
            self.clear_queue();
        }

        for command in outcome.commands {
            self.enqueue(command);
        }

        if outcome.completed {
            self.deliver_records();
        }
    }

    fn deliver_records(&mut self) {
        if self.comm_failure {
            return;
        }
        for record in self.session.drain() {
            tracing::info!("delivering wagon {}", record.wagon_serial_number);
            self.publish(Channel::Weighment, &record);
        }
    }
}

struct Inner {
    state: Mutex<EngineState>,
    dispatch: DispatchTable,
    scheduler: Scheduler,
    topics: Topics,
    shutdown: watch::Sender<bool>,
}

/// Resolves once the engine has been shut down
pub(crate) async fn wait_for_shutdown(mut signal: watch::Receiver<bool>) {
    // an error means the engine itself is gone
    let _ = signal.wait_for(|x| *x).await;
}

/// Handle to the shared engine state, cloned into every task
#[derive(Clone)]
pub(crate) struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    pub(crate) fn new(topics: Topics, egress: UnboundedSender<Publication>) -> Self {
        let scheduler = Scheduler::new();
        let state = EngineState {
            session: WeighmentSession::new(),
            status_mode: false,
            status_control: false,
            firmware: Firmware::default(),
            monitoring: false,
            polling: false,
            comm_failure: false,
            epoch: 0,
            scheduler: scheduler.clone(),
            topics: topics.clone(),
            egress,
        };
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                dispatch: DispatchTable::new(),
                scheduler,
                topics,
                shutdown: watch::channel(false).0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        // every critical section leaves the state consistent before it can panic
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub(crate) fn topics(&self) -> &Topics {
        &self.inner.topics
    }

    pub(crate) fn enqueue(&self, command: Command) -> bool {
        self.lock().enqueue(command)
    }

    pub(crate) fn firmware(&self) -> Firmware {
        self.lock().firmware.clone()
    }

    /// queue the identification reads unless both strings are already known
    pub(crate) fn request_firmware(&self) {
        let state = self.lock();
        if !state.firmware.is_known() {
            state.enqueue(Command::firmware_version());
            state.enqueue(Command::firmware_release_date());
        }
    }

    pub(crate) fn handle_message(&self, topic: &str, payload: &str) -> Result<(), CommandParseError> {
        let command = BusCommand::from_topic(self.topics(), topic, payload)?;
        self.apply(command)?;
        Ok(())
    }

    /// act on a bus command; the queue and session change in one critical section
    pub(crate) fn apply(&self, command: BusCommand) -> Result<(), InvalidRequest> {
        tracing::info!("bus command: {:?}", command);
        let mut state = self.lock();
        match command {
            BusCommand::Initiate { axles } => {
                state.clear_queue();
                state.reset_session();
                state.enqueue(Command::init(axles));
                state.monitoring = true;
                state.polling = true;
            }
            BusCommand::Terminate => {
                state.clear_queue();
                state.reset_session();
                state.enqueue(Command::terminate());
                state.monitoring = false;
                state.polling = false;
            }
            BusCommand::StatusInitiate => {
                state.polling = true;
                state.status_control = false;
                state.status_mode = true;
            }
            BusCommand::StatusTerminate => {
                state.status_mode = false;
                state.polling = false;
                state.status_control = false;
                state.clear_queue();
            }
            BusCommand::ResetOutputs => {
                state.clear_queue();
                state.enqueue(Command::output_reset());
                state.status_mode = true;
                state.polling = true;
                state.status_control = false;
            }
            BusCommand::Scoreboard(text) => {
                let command = Command::scoreboard(&text, state.topics.host_id())?;
                state.clear_queue();
                state.enqueue(command);
            }
            BusCommand::SetOutput { pin, on } => {
                let command = Command::output_control(pin, on)?;
                state.status_control = true;
                state.polling = true;
                state.clear_queue();
                state.enqueue(command);
            }
            BusCommand::SendFrom(serial) => {
                state.session.deliver_from(serial);
                state.deliver_records();
            }
        }
        Ok(())
    }

    /// route a validated response body (command id first) to its handler
    pub(crate) fn handle_response(&self, command: &Command, body: &[u8], level: AppDecodeLevel) {
        if level.data_values() {
            tracing::info!("APP RX - {} {:02X?}", command, body);
        } else if level.command_id() {
            tracing::info!("APP RX - {}", command);
        }

        let handler = self.inner.dispatch.get(command.id());
        let now = chrono::Local::now().naive_local();
        let mut state = self.lock();
        if let Err(err) = handler.handle(&mut state, command, body, now) {
            tracing::warn!("unable to parse response to {}: {}", command, err);
        }
    }

    /// a command completed; lifts the failure latch and delivers held records
    pub(crate) fn on_success(&self) {
        let mut state = self.lock();
        if state.comm_failure {
            tracing::info!("communication with the controller restored");
            state.comm_failure = false;
            state.deliver_records();
        }
    }

    /// a command exhausted its retries
    pub(crate) fn on_persistent_failure(&self) {
        let mut state = self.lock();
        tracing::error!("serial communication failed");
        match state.session.last_snapshot() {
            Some(snapshot) => state.publish(Channel::ErrorStatus, snapshot),
            None => state.publish(Channel::ErrorStatus, &serde_json::json!({})),
        }
        state.comm_failure = true;
        state.clear_queue();
    }

    /// idle queries for one monitor cycle, clearing status mode while weighing
    pub(crate) fn monitor_plan(&self) -> Vec<Command> {
        let mut state = self.lock();
        if state.monitoring {
            state.status_mode = false;
            vec![
                Command::wagon_weight(crate::constants::wagon::SCAN_WAGON, Priority::Low),
                Command::output_status(Priority::Low),
                Command::input_status(Priority::Low),
            ]
        } else if state.polling {
            vec![
                Command::output_status(Priority::Low),
                Command::input_status(Priority::Low),
                Command::wagon_weight(crate::constants::wagon::SCAN_WAGON, Priority::Low),
            ]
        } else {
            Vec::new()
        }
    }

    #[cfg(test)]
    pub(crate) fn is_comm_failure(&self) -> bool {
        self.lock().comm_failure
    }

    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }

    /// discard pending work and refuse new commands
    pub(crate) fn shutdown(&self) {
        {
            let state = self.lock();
            state.clear_queue();
            state.scheduler.close();
        }
        self.inner.shutdown.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandId;
    use crate::weighment::tests::Body;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn engine() -> (Engine, UnboundedReceiver<Publication>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Engine::new(Topics::default(), tx), rx)
    }

    fn queued(engine: &Engine) -> Vec<Command> {
        std::iter::from_fn(|| engine.scheduler().try_dequeue()).collect()
    }

    fn published(rx: &mut UnboundedReceiver<Publication>) -> Vec<Publication> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    fn respond(engine: &Engine, command: &Command, body: &[u8]) {
        engine.handle_response(command, body, AppDecodeLevel::Nothing);
    }

    #[test]
    fn initiate_resets_session_and_queues_init() {
        let (engine, _rx) = engine();
        engine.enqueue(Command::output_status(Priority::Low));
        engine.apply(BusCommand::Initiate { axles: 2 }).unwrap();

        let commands = queued(&engine);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].id(), CommandId::InitAxleEliminate);
        assert_eq!(commands[0].payload(), &[2]);
        assert_eq!(commands[0].epoch, 1);
        assert_eq!(engine.monitor_plan()[0].id(), CommandId::WagonWeight);
    }

    #[test]
    fn terminate_stops_monitoring() {
        let (engine, _rx) = engine();
        engine.apply(BusCommand::Initiate { axles: 0 }).unwrap();
        engine.apply(BusCommand::Terminate).unwrap();
        let commands = queued(&engine);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].id(), CommandId::Terminate);
        assert!(engine.monitor_plan().is_empty());
    }

    #[test]
    fn monitor_plan_follows_mode() {
        let (engine, _rx) = engine();
        assert!(engine.monitor_plan().is_empty());

        engine.apply(BusCommand::StatusInitiate).unwrap();
        let ids: Vec<CommandId> = engine.monitor_plan().iter().map(|x| x.id()).collect();
        assert_eq!(
            ids,
            vec![
                CommandId::OutputStatusRead,
                CommandId::InputStatusRead,
                CommandId::WagonWeight
            ]
        );
        assert!(engine
            .monitor_plan()
            .iter()
            .all(|x| x.priority() == Priority::Low));
    }

    #[test]
    fn status_mode_reports_weight_status() {
        let (engine, mut rx) = engine();
        engine.apply(BusCommand::StatusInitiate).unwrap();
        let scan = Command::wagon_weight(0, Priority::Low);
        respond(&engine, &scan, &Body::default().scan());

        let messages = published(&mut rx);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].channel, Channel::WeightStatus);
        assert_eq!(messages[0].topic, "/Merit/MBMAGH01/WeightStatus/");
        assert_eq!(messages[0].payload, r#"{"SignOfWeight":"+","Weight":39.06}"#);
    }

    #[test]
    fn output_control_reports_current_word() {
        let (engine, mut rx) = engine();
        engine
            .apply(BusCommand::SetOutput { pin: 2, on: true })
            .unwrap();
        let commands = queued(&engine);
        assert_eq!(commands[0].payload(), &[2, 0x40]);

        // current = 0x0002, actual = 0x0000
        respond(
            &engine,
            &Command::output_status(Priority::Low),
            &[0x04, 0x02, 0x00, 0x00, 0x00],
        );
        let messages = published(&mut rx);
        let json: serde_json::Value = serde_json::from_str(&messages[0].payload).unwrap();
        assert_eq!(json["OverSpeedLampRelay"], 1);
        assert_eq!(json["Message"], "");
    }

    #[test]
    fn scoreboard_appends_host_id() {
        let (engine, _rx) = engine();
        engine
            .apply(BusCommand::Scoreboard("SB".to_string()))
            .unwrap();
        assert_eq!(queued(&engine)[0].payload(), b"SBMBMAGH01");

        let long = "x".repeat(250);
        assert_eq!(
            engine.apply(BusCommand::Scoreboard(long)),
            Err(InvalidRequest::PayloadTooLarge(258, 255))
        );
    }

    #[test]
    fn responses_from_an_earlier_session_are_ignored() {
        let (engine, mut rx) = engine();
        engine.apply(BusCommand::Initiate { axles: 0 }).unwrap();
        let stale = Command::wagon_weight(0, Priority::Low).with_epoch(0);
        respond(&engine, &stale, &Body::default().scan());
        assert!(published(&mut rx).is_empty());

        let current = Command::wagon_weight(0, Priority::Low).with_epoch(1);
        respond(&engine, &current, &Body::default().scan());
        assert_eq!(published(&mut rx).len(), 1);
    }

    #[test]
    fn failure_latch_holds_records_until_success() {
        let (engine, mut rx) = engine();
        engine.apply(BusCommand::Initiate { axles: 0 }).unwrap();
        queued(&engine);

        let scan = Command::wagon_weight(0, Priority::Low).with_epoch(1);
        let start = Body {
            wagons_weighed: 1,
            ..Body::default()
        };
        respond(&engine, &scan, &start.scan());
        assert_eq!(queued(&engine)[0].payload()[0], 1);

        engine.on_persistent_failure();
        let errors = published(&mut rx);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].channel, Channel::ErrorStatus);
        assert!(engine.is_comm_failure());

        let query = Command::wagon_weight(1, Priority::High).with_epoch(1);
        respond(&engine, &query, &Body::default().wagon());
        assert!(published(&mut rx).is_empty());

        engine.on_success();
        let delivered = published(&mut rx);
        assert_eq!(delivered.len(), 1);
        let json: serde_json::Value = serde_json::from_str(&delivered[0].payload).unwrap();
        assert_eq!(json["WagonSerialNumber"], 1);
        assert_eq!(json["WE"], true);
    }

    #[test]
    fn send_from_redelivers_stored_records() {
        let (engine, mut rx) = engine();
        engine.apply(BusCommand::Initiate { axles: 0 }).unwrap();
        let scan = Command::wagon_weight(0, Priority::Low).with_epoch(1);
        let start = Body {
            wagons_weighed: 1,
            ..Body::default()
        };
        respond(&engine, &scan, &start.scan());
        let query = Command::wagon_weight(1, Priority::High).with_epoch(1);
        respond(&engine, &query, &Body::default().wagon());
        let first = published(&mut rx);
        assert!(first.iter().any(|x| x.payload.contains("\"WE\":true")));

        engine
            .handle_message("/Merit/MBMAGH01/Weighment/sendFrom/", "1")
            .unwrap();
        let again = published(&mut rx);
        assert_eq!(again.len(), 1);
        assert!(again[0].payload.contains("\"WagonSerialNumber\":1"));
    }

    #[test]
    fn completions_are_published_after_redelivery_of_missing_serials() {
        let (engine, mut rx) = engine();
        engine.apply(BusCommand::Initiate { axles: 0 }).unwrap();
        let scan = Command::wagon_weight(0, Priority::Low).with_epoch(1);
        let start = Body {
            wagons_weighed: 1,
            ..Body::default()
        };
        respond(&engine, &scan, &start.scan());
        let first = Command::wagon_weight(1, Priority::High).with_epoch(1);
        respond(&engine, &first, &Body::default().wagon());
        published(&mut rx);

        // serial 0 is never stored, delivery restarts from serial 1
        engine
            .handle_message("/Merit/MBMAGH01/Weighment/sendFrom/", "0")
            .unwrap();
        let again = published(&mut rx);
        assert_eq!(again.len(), 1);
        assert!(again[0].payload.contains("\"WagonSerialNumber\":1"));

        engine
            .handle_message("/Merit/MBMAGH01/Weighment/sendFrom/", "9")
            .unwrap();
        assert!(published(&mut rx).is_empty());

        let second = Command::wagon_weight(2, Priority::High).with_epoch(1);
        let body = Body {
            serial: 2,
            ..Body::default()
        };
        respond(&engine, &second, &body.wagon());
        let completed: Vec<serde_json::Value> = published(&mut rx)
            .iter()
            .filter(|x| x.channel == Channel::Weighment)
            .map(|x| serde_json::from_str(&x.payload).unwrap())
            .filter(|x: &serde_json::Value| x["WE"] == true)
            .collect();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0]["WagonSerialNumber"], 2);
    }

    #[test]
    fn firmware_strings_are_stored() {
        let (engine, _rx) = engine();
        engine.request_firmware();
        let commands = queued(&engine);
        assert_eq!(commands.len(), 2);

        respond(&engine, &commands[0], b"\x50TLC FW 1.0");
        respond(&engine, &commands[1], b"\x5101-02-2023");
        assert_eq!(
            engine.firmware(),
            Firmware {
                version: Some("TLC FW 1.0".to_string()),
                release_date: Some("01-02-2023".to_string()),
            }
        );

        engine.request_firmware();
        assert!(queued(&engine).is_empty());
    }

    #[test]
    fn shutdown_refuses_new_commands() {
        let (engine, _rx) = engine();
        engine.enqueue(Command::output_status(Priority::Low));
        engine.shutdown();
        assert!(!engine.enqueue(Command::output_status(Priority::Low)));
        assert!(queued(&engine).is_empty());
    }
}
