//! Integration tests for the bridge

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use tlclink::*;

const WAGON_WEIGHT: u8 = 0x5A;

/// Payload of a wagon weight response without the command byte
fn scan(wagons_weighed: u8) -> Vec<u8> {
    // '+', 39.06, direction 1, message "Weighing"
    let mut payload = vec![b'+', 0x42, 0x0F, 0x00, 1, 7, wagons_weighed, 0, 0];
    for value in [4u16, 125, 130, 128, 1, 2, 3, 4, 4, 0] {
        payload.extend_from_slice(&value.to_le_bytes());
    }
    payload
}

fn wagon(wagons_weighed: u8, serial: u8, wagon_type: i8, axles: [i16; 4]) -> Vec<u8> {
    let mut payload = scan(wagons_weighed);
    payload.push(serial);
    payload.push(wagon_type as u8);
    // 50.03
    payload.extend_from_slice(&[0x8B, 0x13, 0x00]);
    for axle in axles {
        payload.extend_from_slice(&axle.to_le_bytes());
    }
    payload.extend_from_slice(&42u16.to_le_bytes());
    payload
}

/// Scripted stand-in for the weighing controller
struct Controller {
    silent: bool,
    wagons_weighed: u8,
    wagons: HashMap<u8, VecDeque<Vec<u8>>>,
    // current word LSB/MSB, actual word LSB/MSB
    status: [u8; 4],
    requests: UnboundedSender<(u8, Vec<u8>)>,
}

impl Controller {
    fn new(requests: UnboundedSender<(u8, Vec<u8>)>) -> Self {
        Self {
            silent: false,
            wagons_weighed: 0,
            wagons: HashMap::new(),
            status: [0; 4],
            requests,
        }
    }

    fn reply(&mut self, command: u8, payload: &[u8]) -> Option<Vec<u8>> {
        if self.silent {
            return None;
        }
        match command {
            0x04 | 0x0A => Some(self.status.to_vec()),
            0x50 => Some(b"TLC-3.2".to_vec()),
            0x51 => Some(b"12-06-2023".to_vec()),
            WAGON_WEIGHT => {
                let number = payload[0];
                match self.wagons.get_mut(&number) {
                    Some(replies) if replies.len() > 1 => replies.pop_front(),
                    Some(replies) => replies.front().cloned(),
                    None => Some(scan(self.wagons_weighed)),
                }
            }
            _ => Some(Vec::new()),
        }
    }

    async fn serve(mut self, mut io: DuplexStream) {
        let codec = FrameCodec::default();
        let mut buffer = [0u8; 512];
        loop {
            let count = match io.read(&mut buffer).await {
                Ok(0) | Err(_) => return,
                Ok(count) => count,
            };
            let Ok(frame) = unstuff(&buffer[..count]) else {
                continue;
            };
            let command = frame[4];
            let payload = frame[5..frame.len() - 2].to_vec();
            let _ = self.requests.send((command, payload.clone()));

            if let Some(reply) = self.reply(command, &payload) {
                let bytes = codec.encode(command, &reply).unwrap();
                if io.write_all(&bytes).await.is_err() {
                    return;
                }
            }
        }
    }
}

struct Harness {
    bridge: Bridge,
    publications: UnboundedReceiver<Publication>,
    requests: UnboundedReceiver<(u8, Vec<u8>)>,
}

fn start(configure: impl FnOnce(&mut Controller)) -> Harness {
    let (local, remote) = tokio::io::duplex(4096);
    let (requests_tx, requests) = tokio::sync::mpsc::unbounded_channel();
    let mut controller = Controller::new(requests_tx);
    configure(&mut controller);
    tokio::spawn(controller.serve(remote));

    let (tx, publications) = tokio::sync::mpsc::unbounded_channel();
    let bridge = spawn_stream_bridge_task(local, BridgeConfig::default(), Box::new(tx), None);
    Harness {
        bridge,
        publications,
        requests,
    }
}

impl Harness {
    async fn next(&mut self, channel: Channel) -> serde_json::Value {
        self.next_matching(channel, |_| true).await
    }

    async fn next_matching(
        &mut self,
        channel: Channel,
        matches: impl Fn(&serde_json::Value) -> bool,
    ) -> serde_json::Value {
        let search = async {
            loop {
                let publication = self.publications.recv().await.unwrap();
                if publication.channel != channel {
                    continue;
                }
                assert_eq!(publication.topic, self.bridge.topics().egress(channel));
                let value: serde_json::Value = serde_json::from_str(&publication.payload).unwrap();
                if matches(&value) {
                    return value;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(120), search)
            .await
            .expect("publication not received")
    }
}

#[tokio::test(start_paused = true)]
async fn silent_controller_is_reported_once_after_ten_attempts() {
    let mut harness = start(|controller| controller.silent = true);

    let first = harness.publications.recv().await.unwrap();
    assert_eq!(first.channel, Channel::ErrorStatus);
    assert_eq!(first.topic, "/Merit/MBMAGH01/ErrorStatus/");
    assert_eq!(first.payload, "{}");

    tokio::time::sleep(Duration::from_secs(10)).await;
    let requests: Vec<(u8, Vec<u8>)> =
        std::iter::from_fn(|| harness.requests.try_recv().ok()).collect();
    assert_eq!(requests.len(), 10);
    assert!(requests.iter().all(|(command, _)| *command == 0x50));
    assert!(harness.publications.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn wagon_is_requeried_until_every_axle_is_weighed() {
    let mut harness = start(|controller| {
        controller.wagons_weighed = 1;
        controller.wagons.insert(
            1,
            VecDeque::from(vec![
                wagon(1, 1, 4, [-4, -4, -4, -4]),
                wagon(1, 1, 4, [-3, -4, -4, -4]),
                wagon(1, 1, 4, [120, 130, 125, 128]),
            ]),
        );
    });
    harness
        .bridge
        .handle_message("/Merit/MBMAGH01/COMMAND/", "Initiate")
        .unwrap();

    let pending = harness
        .next_matching(Channel::Weighment, |x| x["WE"] == false)
        .await;
    assert_eq!(pending["WagonSerialNumber"], 1);
    assert!(pending.get("EndTime").is_none());

    let complete = harness
        .next_matching(Channel::Weighment, |x| x["WE"] == true)
        .await;
    assert_eq!(complete["WagonSerialNumber"], 1);
    assert_eq!(complete["WagonType"], 4);
    assert_eq!(complete["WagonWeight"], 50.03);
    assert_eq!(complete["WagonSpeed"], 4.2);
    assert_eq!(complete["Axle1Weight"], 1.2);
    assert_eq!(complete["Axle4Weight"], 1.28);
    assert_eq!(complete["Weight"], 39.06);
    assert_eq!(complete["SignOfWeight"], "+");
    assert!(complete["StartTime"].is_string());
    assert!(complete["EndTime"].is_string());

    let queries: Vec<u8> = std::iter::from_fn(|| harness.requests.try_recv().ok())
        .filter(|(command, payload)| *command == WAGON_WEIGHT && payload[0] == 1)
        .map(|(_, payload)| payload[0])
        .collect();
    // idle scans may also ask for the wagon while it is being weighed
    assert!(queries.len() >= 3);

    assert_eq!(
        harness.bridge.firmware(),
        Firmware {
            version: Some("TLC-3.2".to_string()),
            release_date: Some("12-06-2023".to_string()),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn wagon_serial_excludes_locos() {
    let mut harness = start(|controller| {
        controller.wagons_weighed = 2;
        controller
            .wagons
            .insert(1, VecDeque::from(vec![wagon(2, 1, -4, [-4, -4, -4, -4])]));
        controller
            .wagons
            .insert(2, VecDeque::from(vec![wagon(2, 2, 4, [120, 130, 125, 128])]));
    });
    harness
        .bridge
        .handle_message("/Merit/MBMAGH01/COMMAND/", "Initiate,0")
        .unwrap();

    let loco = harness
        .next_matching(Channel::Weighment, |x| x["WagonType"] == -4)
        .await;
    assert_eq!(loco["WagonSerialNumber"], 0);
    assert_eq!(loco["WE"], true);

    let record = harness
        .next_matching(Channel::Weighment, |x| x["WagonType"] == 4)
        .await;
    assert_eq!(record["WagonSerialNumber"], 1);
    assert_eq!(record["WE"], true);

    // stored records can be requested again
    harness
        .bridge
        .handle_message("/Merit/MBMAGH01/Weighment/sendFrom/", "1")
        .unwrap();
    let again = harness
        .next_matching(Channel::Weighment, |x| x["WagonSerialNumber"] == 1)
        .await;
    assert_eq!(again, record);
}

#[tokio::test(start_paused = true)]
async fn status_page_reports_platform_weight() {
    let mut harness = start(|_| {});
    harness
        .bridge
        .handle_message("/Merit/MBMAGH01/Status/", "Initiate")
        .unwrap();

    let weight = harness.next(Channel::WeightStatus).await;
    assert_eq!(
        weight,
        serde_json::json!({ "SignOfWeight": "+", "Weight": 39.06 })
    );

    let inputs = harness.next(Channel::InputStatus).await;
    assert_eq!(inputs["TrackSwitch1A"], 0);
    assert_eq!(inputs["Message"], "");
}

#[tokio::test(start_paused = true)]
async fn output_control_is_written_and_reported() {
    let mut harness = start(|controller| {
        // current drives AlarmHooter, actual reads back SystemReady
        controller.status = [0x04, 0x00, 0x01, 0x00];
    });

    assert_eq!(
        harness
            .bridge
            .handle_message("/Merit/MBMAGH01/Status/Control/", "17,true"),
        Err(CommandParseError::BadRequest(InvalidRequest::PinOutOfRange(
            17
        )))
    );
    assert!(matches!(
        harness.bridge.handle_message("/Merit/MBMAGH01/Nowhere/", "3,true"),
        Err(CommandParseError::UnknownTopic(_))
    ));

    harness
        .bridge
        .handle_message("/Merit/MBMAGH01/Status/Control/", "3,true")
        .unwrap();

    let outputs = harness.next(Channel::OutputStatus).await;
    assert_eq!(outputs["AlarmHooter"], 1);
    assert_eq!(outputs["SystemReady"], 0);

    let writes: Vec<Vec<u8>> = std::iter::from_fn(|| harness.requests.try_recv().ok())
        .filter(|(command, _)| *command == 0x1E)
        .map(|(_, payload)| payload)
        .collect();
    assert_eq!(writes, vec![vec![3, 0x40]]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_bridge() {
    let mut harness = start(|_| {});
    harness
        .bridge
        .handle_message("/Merit/MBMAGH01/Status/", "Initiate")
        .unwrap();
    harness.next(Channel::WeightStatus).await;

    harness.bridge.shutdown();
    tokio::time::sleep(Duration::from_secs(5)).await;
    while harness.requests.try_recv().is_ok() {}
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(harness.requests.try_recv().is_err());
}
