use crate::MaybeAsync;

/// Host id used when none is configured
pub const DEFAULT_HOST_ID: &str = "MBMAGH01";

/// Logical channels the bridge publishes on
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// wagon records, in-progress records and idle telemetry
    Weighment,
    /// digital input map
    InputStatus,
    /// digital output map
    OutputStatus,
    /// platform weight while the status page is open
    WeightStatus,
    /// communication failure reports
    ErrorStatus,
}

impl Channel {
    fn name(self) -> &'static str {
        match self {
            Channel::Weighment => "Weighment",
            Channel::InputStatus => "InputStatus",
            Channel::OutputStatus => "OutputStatus",
            Channel::WeightStatus => "WeightStatus",
            Channel::ErrorStatus => "ErrorStatus",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Logical channels the bridge accepts commands on
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IngressChannel {
    /// weighment initiate and terminate
    Command,
    /// status page initiate and terminate
    Status,
    /// redelivery of stored records from a serial onward
    WagonRequest,
    /// output control, output reset and scoreboard
    StatusControl,
}

impl IngressChannel {
    const ALL: [IngressChannel; 4] = [
        IngressChannel::Command,
        IngressChannel::Status,
        IngressChannel::WagonRequest,
        IngressChannel::StatusControl,
    ];

    fn path(self) -> &'static str {
        match self {
            IngressChannel::Command => "COMMAND",
            IngressChannel::Status => "Status",
            IngressChannel::WagonRequest => "Weighment/sendFrom",
            IngressChannel::StatusControl => "Status/Control",
        }
    }
}

/// Maps logical channels to bus topics for one weighbridge
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topics {
    host_id: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self::new(DEFAULT_HOST_ID)
    }
}

impl Topics {
    /// topics of the weighbridge identified by `host_id`
    pub fn new(host_id: &str) -> Self {
        Self {
            host_id: host_id.to_string(),
        }
    }

    /// weighbridge id, also appended to scoreboard writes
    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    fn topic(&self, path: &str) -> String {
        format!("/Merit/{}/{}/", self.host_id, path)
    }

    /// topic an egress channel publishes on
    pub fn egress(&self, channel: Channel) -> String {
        self.topic(channel.name())
    }

    /// topic an ingress channel is subscribed on
    pub fn ingress(&self, channel: IngressChannel) -> String {
        self.topic(channel.path())
    }

    /// every topic the bridge subscribes to
    pub fn subscriptions(&self) -> Vec<String> {
        IngressChannel::ALL
            .iter()
            .map(|x| self.ingress(*x))
            .collect()
    }

    /// identify the ingress channel of a received topic
    pub fn classify(&self, topic: &str) -> Option<IngressChannel> {
        IngressChannel::ALL
            .into_iter()
            .find(|x| self.ingress(*x) == topic)
    }
}

/// A JSON message ready to be published
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Publication {
    /// logical channel
    pub channel: Channel,
    /// bus topic of the channel
    pub topic: String,
    /// serialized JSON body
    pub payload: String,
}

/// Receives everything the bridge publishes
pub trait Sink: Send {
    /// publish one message
    fn publish(&mut self, publication: Publication) -> MaybeAsync<()>;
}

/// Sink that discards every message
#[derive(Copy, Clone, Debug, Default)]
pub struct NullSink;

impl Sink for NullSink {
    fn publish(&mut self, _publication: Publication) -> MaybeAsync<()> {
        MaybeAsync::ready(())
    }
}

impl Sink for tokio::sync::mpsc::UnboundedSender<Publication> {
    fn publish(&mut self, publication: Publication) -> MaybeAsync<()> {
        if self.send(publication).is_err() {
            tracing::warn!("publication dropped, receiver closed");
        }
        MaybeAsync::ready(())
    }
}
