use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use scursor::ReadCursor;
use serde::{Serialize, Serializer};

use crate::command::{Command, Priority};
use crate::constants::wagon;
use crate::error::ResponseError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub(crate) fn timestamp(now: NaiveDateTime) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

/// One axle weight as reported by the controller
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AxleSample {
    /// the axle has been weighed
    Ready(i16),
    /// weighing of the axle has started but not finished
    InProgress,
    /// the axle has not been reached yet
    NotInitialized,
}

impl AxleSample {
    /// interpret a raw little-endian axle field
    pub fn from_raw(raw: u16) -> Self {
        match raw as i16 {
            wagon::AXLE_IN_PROGRESS => AxleSample::InProgress,
            wagon::AXLE_NOT_INITIALIZED => AxleSample::NotInitialized,
            value => AxleSample::Ready(value),
        }
    }

    /// true once the axle carries a real weight
    pub fn is_ready(self) -> bool {
        matches!(self, AxleSample::Ready(_))
    }
}

/// Signed vehicle type; positive values count axles, -3 and -4 are locos
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct WagonType(pub i8);

impl WagonType {
    /// three axle locomotive
    pub const THREE_AXLE_LOCO: WagonType = WagonType(-3);
    /// four axle locomotive
    pub const FOUR_AXLE_LOCO: WagonType = WagonType(-4);

    /// locos are excluded from wagon numbering
    pub fn is_loco(self) -> bool {
        self == Self::THREE_AXLE_LOCO || self == Self::FOUR_AXLE_LOCO
    }

    /// how many axle samples must be ready before the wagon is complete
    pub fn required_axles(self) -> usize {
        self.0.clamp(0, 4) as usize
    }

    /// human readable name, if the type is known
    pub fn name(self) -> Option<&'static str> {
        match self.0 {
            2 => Some("2AxleWagon"),
            4 => Some("4AxleWagon"),
            -3 => Some("3AxleLoco"),
            -4 => Some("4AxleLoco"),
            _ => None,
        }
    }
}

/// Status message carried by every wagon weight response
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MessageCode(pub u8);

impl MessageCode {
    /// weighing of the rake has finished
    pub const WEIGHING_OVER: MessageCode = MessageCode(5);
    /// the controller could not classify the vehicle on the track
    pub const UNKNOWN_VEHICLE: MessageCode = MessageCode(8);
    /// a locomotive was detected
    pub const LOCOMOTIVE_SENSED: MessageCode = MessageCode(11);

    /// the name published for this code
    pub fn name(self) -> Cow<'static, str> {
        let name = match self.0 {
            1 => "SystemReady",
            2 => "DirectionIn",
            3 => "DirectionOut",
            4 => "TrainForward",
            5 => "WeighingOver",
            6 => "TrainReversal",
            7 => "Weighing",
            8 => "UnknownVehicle",
            9 => "2AxleWagon",
            10 => "4AxleWagon",
            11 => "LocomotiveSensed",
            12 => "NewVehicle",
            13 => "EndOfWeighing",
            14 => "Checking Weighing System interface",
            15 => "End Of Weighing",
            16 => "SystemNotReadyForWeighing",
            17 => "AbortWeighing",
            20 => "NotValidExpectedTrackSwitch",
            21 => "NewRake",
            22 => "4AxleLocoSensed",
            // older bridges published "O NotDefined" (letter O) for code 0
            x => return Cow::Owned(format!("{x} NotDefined")),
        };
        Cow::Borrowed(name)
    }
}

impl std::fmt::Display for MessageCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

impl Serialize for MessageCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.name())
    }
}

/// Platform weight as published
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Weight {
    /// signed weight scaled to tonnes
    Scaled(f64),
    /// the sign byte was not recognised, so the raw value is passed through
    Raw(u32),
    /// the controller is in weighing mode and reports no platform weight
    WeighingMode,
}

impl Weight {
    fn new(sign: u8, raw: u32) -> Self {
        match sign {
            b'+' => Weight::Scaled(f64::from(raw) / wagon::WEIGHT_DIVISOR),
            b'-' => Weight::Scaled(
                f64::from(wagon::NEGATIVE_WEIGHT_OFFSET.saturating_sub(raw)) / wagon::WEIGHT_DIVISOR,
            ),
            _ => Weight::Raw(raw),
        }
    }
}

impl Serialize for Weight {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Weight::Scaled(x) => serializer.serialize_f64(*x),
            Weight::Raw(x) => serializer.serialize_u32(*x),
            Weight::WeighingMode => serializer.serialize_str("WL.Mode"),
        }
    }
}

/// Wagon specific fields, present only in full length responses
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WagonDetail {
    /// serial number of the wagon as counted by the controller, locos included
    pub serial: u8,
    /// vehicle type
    pub wagon_type: WagonType,
    /// raw wagon weight
    pub raw_weight: u32,
    /// raw axle weights, axle 1 first
    pub axles: [u16; 4],
    /// raw wagon speed
    pub speed: u16,
}

impl WagonDetail {
    fn parse(cursor: &mut ReadCursor<'_>) -> Result<Self, ResponseError> {
        let serial = cursor.read_u8()?;
        let wagon_type = WagonType(cursor.read_u8()? as i8);
        let raw_weight = read_u24_le(cursor)?;
        let axles = [
            cursor.read_u16_le()?,
            cursor.read_u16_le()?,
            cursor.read_u16_le()?,
            cursor.read_u16_le()?,
        ];
        let speed = cursor.read_u16_le()?;
        Ok(Self {
            serial,
            wagon_type,
            raw_weight,
            axles,
            speed,
        })
    }

    /// axle weights with the not-ready markers decoded
    pub fn samples(&self) -> [AxleSample; 4] {
        self.axles.map(AxleSample::from_raw)
    }

    /// true when every axle the wagon type requires has been weighed
    pub fn axles_ready(&self) -> bool {
        self.samples()
            .iter()
            .take(self.wagon_type.required_axles())
            .all(|x| x.is_ready())
    }
}

/// A decoded wagon weight response
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WagonResponse {
    /// `'+'` or `'-'`
    pub sign: u8,
    /// raw platform weight magnitude
    pub raw_weight: u32,
    /// direction of travel
    pub direction: u8,
    /// status message
    pub message: MessageCode,
    /// number of vehicles weighed so far in this rake
    pub wagons_weighed: u8,
    /// index of the last axle seen
    pub last_axle: u16,
    /// raw speeds measured at the first and second track switch pairs
    pub speed_tl_pair: [u16; 2],
    /// raw speed measured while weighing
    pub speed_from_weigh: u16,
    /// axle counts at each track switch pair
    pub axle_count_pairs: [u16; 4],
    /// number of axles weighed
    pub axles_weighed: u16,
    /// number of axles ignored
    pub axles_ignored: u16,
    /// wagon fields, absent in idle scan responses
    pub detail: Option<WagonDetail>,
}

fn read_u24_le(cursor: &mut ReadCursor<'_>) -> Result<u32, ResponseError> {
    let lsb = u32::from(cursor.read_u8()?);
    let mid = u32::from(cursor.read_u8()?);
    let msb = u32::from(cursor.read_u8()?);
    Ok((msb << 16) | (mid << 8) | lsb)
}

impl WagonResponse {
    /// parse a payload beginning with the command id
    pub fn parse(body: &[u8]) -> Result<Self, ResponseError> {
        if body.len() < wagon::SCAN_PAYLOAD_LENGTH {
            return Err(ResponseError::InsufficientBytes {
                required: wagon::SCAN_PAYLOAD_LENGTH,
                actual: body.len(),
            });
        }

        let mut cursor = ReadCursor::new(body);
        // command id
        cursor.read_u8()?;
        let sign = cursor.read_u8()?;
        let raw_weight = read_u24_le(&mut cursor)?;
        let direction = cursor.read_u8()?;
        let message = MessageCode(cursor.read_u8()?);
        let wagons_weighed = cursor.read_u8()?;
        // reserved
        cursor.read_u16_le()?;
        let last_axle = cursor.read_u16_le()?;
        let speed_tl_pair = [cursor.read_u16_le()?, cursor.read_u16_le()?];
        let speed_from_weigh = cursor.read_u16_le()?;
        let axle_count_pairs = [
            cursor.read_u16_le()?,
            cursor.read_u16_le()?,
            cursor.read_u16_le()?,
            cursor.read_u16_le()?,
        ];
        let axles_weighed = cursor.read_u16_le()?;
        let axles_ignored = cursor.read_u16_le()?;

        let detail = if body.len() >= wagon::WAGON_PAYLOAD_LENGTH {
            Some(WagonDetail::parse(&mut cursor)?)
        } else {
            None
        };

        Ok(Self {
            sign,
            raw_weight,
            direction,
            message,
            wagons_weighed,
            last_axle,
            speed_tl_pair,
            speed_from_weigh,
            axle_count_pairs,
            axles_weighed,
            axles_ignored,
            detail,
        })
    }

    /// platform weight with the sign applied
    pub fn weight(&self) -> Weight {
        Weight::new(self.sign, self.raw_weight)
    }
}

fn speed(raw: u16) -> f64 {
    f64::from(raw) / wagon::SPEED_DIVISOR
}

fn weight(raw: u32) -> f64 {
    f64::from(raw) / wagon::WEIGHT_DIVISOR
}

/// Platform telemetry published while no wagon is being weighed
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Telemetry {
    /// sign character of the platform weight
    pub sign_of_weight: char,
    /// platform weight
    pub weight: Weight,
    /// status message
    pub message: MessageCode,
    /// direction of travel
    pub direction: u8,
    /// vehicles weighed so far
    pub wagons_weighed: u8,
    /// index of the last axle seen
    pub last_axle: u16,
    /// speed at the first track switch pair
    #[serde(rename = "SpeedTLPair1")]
    pub speed_tl_pair1: f64,
    /// speed at the second track switch pair
    #[serde(rename = "SpeedTLPair2")]
    pub speed_tl_pair2: f64,
    /// speed while weighing
    pub speed_from_weigh: f64,
    #[allow(missing_docs)]
    pub axle_count_pair1: u16,
    #[allow(missing_docs)]
    pub axle_count_pair2: u16,
    #[allow(missing_docs)]
    pub axle_count_pair3: u16,
    #[allow(missing_docs)]
    pub axle_count_pair4: u16,
    /// number of axles weighed
    pub axle_weight: u16,
    /// number of axles ignored
    pub axle_ignore: u16,
}

impl From<&WagonResponse> for Telemetry {
    fn from(response: &WagonResponse) -> Self {
        Self {
            sign_of_weight: char::from(response.sign),
            weight: response.weight(),
            message: response.message,
            direction: response.direction,
            wagons_weighed: response.wagons_weighed,
            last_axle: response.last_axle,
            speed_tl_pair1: speed(response.speed_tl_pair[0]),
            speed_tl_pair2: speed(response.speed_tl_pair[1]),
            speed_from_weigh: speed(response.speed_from_weigh),
            axle_count_pair1: response.axle_count_pairs[0],
            axle_count_pair2: response.axle_count_pairs[1],
            axle_count_pair3: response.axle_count_pairs[2],
            axle_count_pair4: response.axle_count_pairs[3],
            axle_weight: response.axles_weighed,
            axle_ignore: response.axles_ignored,
        }
    }
}

/// The weighment result for one vehicle
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct WagonRecord {
    /// serial corrected for the locos seen so far, 0 for a loco
    pub wagon_serial_number: i32,
    /// vehicle type
    pub wagon_type: WagonType,
    /// wagon weight
    pub wagon_weight: f64,
    /// wagon speed
    pub wagon_speed: f64,
    #[allow(missing_docs)]
    pub axle1_weight: f64,
    #[allow(missing_docs)]
    pub axle2_weight: f64,
    #[allow(missing_docs)]
    pub axle3_weight: f64,
    #[allow(missing_docs)]
    pub axle4_weight: f64,
    /// platform fields shared with idle telemetry
    #[serde(flatten)]
    pub telemetry: Telemetry,
    /// weighing of every required axle has finished
    #[serde(rename = "WE")]
    pub weighing_complete: bool,
    /// time the controller was first asked for this wagon
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    /// time the record was finalised
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

/// Platform weight published while the status page is open
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DefaultWeight {
    /// sign character, empty while the controller is weighing
    pub sign_of_weight: String,
    /// platform weight
    pub weight: Weight,
}

impl From<&WagonResponse> for DefaultWeight {
    fn from(response: &WagonResponse) -> Self {
        if response.wagons_weighed == 0 {
            Self {
                sign_of_weight: char::from(response.sign).to_string(),
                weight: response.weight(),
            }
        } else {
            Self {
                sign_of_weight: String::new(),
                weight: Weight::WeighingMode,
            }
        }
    }
}

/// The last record or telemetry built, attached to failure reports
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Snapshot {
    /// a wagon record
    Wagon(WagonRecord),
    /// idle telemetry
    Telemetry(Telemetry),
}

/// Something the state machine wants published
#[derive(Clone, Debug, PartialEq)]
pub enum Report {
    /// an in-progress, loco or unknown vehicle record, published immediately
    Wagon(WagonRecord),
    /// idle telemetry
    Telemetry(Telemetry),
    /// status page weight snapshot
    DefaultWeight(DefaultWeight),
}

/// Effects of handling one wagon weight response
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Outcome {
    /// pending commands are stale and must be discarded before `commands` are queued
    pub clear_queue: bool,
    /// commands to queue, in order
    pub commands: Vec<Command>,
    /// messages to publish, in order
    pub reports: Vec<Report>,
    /// a wagon record was stored and may now be delivered
    pub completed: bool,
}

/// State of the weighment of one rake, reset by every initiate and terminate
#[derive(Clone, Debug, PartialEq)]
pub struct WeighmentSession {
    current: u8,
    previous: u8,
    loco_count: i32,
    started: bool,
    wagons_weighed: u8,
    start_time: String,
    records: BTreeMap<i32, WagonRecord>,
    next_publish: Option<i32>,
    last: Option<Snapshot>,
}

impl Default for WeighmentSession {
    fn default() -> Self {
        Self::new()
    }
}

impl WeighmentSession {
    /// a session waiting for its first wagon
    pub fn new() -> Self {
        Self {
            current: 1,
            previous: 0,
            loco_count: 0,
            started: false,
            wagons_weighed: 0,
            start_time: String::new(),
            records: BTreeMap::new(),
            next_publish: None,
            last: None,
        }
    }

    /// number of the wagon being queried
    pub fn current_wagon(&self) -> u8 {
        self.current
    }

    /// number of vehicles completed, offset by one once weighing begins
    pub fn previous_completed(&self) -> u8 {
        self.previous
    }

    /// locos seen so far
    pub fn loco_count(&self) -> i32 {
        self.loco_count
    }

    /// vehicles weighed according to the last response
    pub fn wagons_weighed(&self) -> u8 {
        self.wagons_weighed
    }

    /// true once the first vehicle of the rake has completed
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// completed record for a corrected serial
    pub fn record(&self, serial: i32) -> Option<&WagonRecord> {
        self.records.get(&serial)
    }

    /// corrected serial the next delivery starts from
    pub fn next_publish(&self) -> Option<i32> {
        self.next_publish
    }

    /// last record or telemetry built
    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        self.last.as_ref()
    }

    /// restart delivery from the first stored serial at or after `serial`
    ///
    /// With nothing stored from there on, delivery resumes at the next completion.
    pub fn deliver_from(&mut self, serial: i32) {
        self.next_publish = self.records.range(serial..).next().map(|(x, _)| *x);
    }

    /// take every record deliverable in serial order, stopping at the first gap
    pub fn drain(&mut self) -> Vec<WagonRecord> {
        let mut records = Vec::new();
        while let Some(next) = self.next_publish {
            match self.records.get(&next) {
                Some(record) => {
                    records.push(record.clone());
                    self.next_publish = Some(next + 1);
                }
                None => break,
            }
        }
        records
    }

    /// advance the session with a wagon weight response
    ///
    /// In status mode only the platform weight is reported. Otherwise the
    /// wagon being weighed is checked first; once it completes, or when the
    /// response is about some other vehicle, the wagons-weighed counter decides
    /// whether to query the next wagon or report idle telemetry.
    pub fn handle(
        &mut self,
        body: &[u8],
        status_mode: bool,
        now: NaiveDateTime,
    ) -> Result<Outcome, ResponseError> {
        let response = WagonResponse::parse(body)?;
        let mut outcome = Outcome::default();

        if status_mode {
            outcome
                .reports
                .push(Report::DefaultWeight(DefaultWeight::from(&response)));
            return Ok(outcome);
        }

        if self.current == self.previous {
            if let Some(detail) = response.detail {
                tracing::info!(
                    "weighing wagon {}, received serial {} ({})",
                    self.current,
                    detail.serial,
                    response.message
                );

                if response.message == MessageCode::UNKNOWN_VEHICLE {
                    self.unknown_vehicle(&response, &detail, now, &mut outcome);
                    return Ok(outcome);
                }

                if detail.serial == self.current
                    && !self.weigh_wagon(&response, &detail, now, &mut outcome)
                {
                    return Ok(outcome);
                }
            }
        }

        self.check_progress(&response, now, &mut outcome);
        Ok(outcome)
    }

    fn query(&self) -> Command {
        Command::wagon_weight(self.current, Priority::High)
    }

    fn status_reads() -> [Command; 2] {
        [
            Command::output_status(Priority::High),
            Command::input_status(Priority::High),
        ]
    }

    fn build_record(&self, response: &WagonResponse, detail: &WagonDetail) -> WagonRecord {
        let [axle1, axle2, axle3, axle4] = detail.axles.map(|x| weight(u32::from(x)));
        WagonRecord {
            wagon_serial_number: if detail.wagon_type.is_loco() {
                0
            } else {
                i32::from(detail.serial) - self.loco_count
            },
            wagon_type: detail.wagon_type,
            wagon_weight: weight(detail.raw_weight),
            wagon_speed: speed(detail.speed),
            axle1_weight: axle1,
            axle2_weight: axle2,
            axle3_weight: axle3,
            axle4_weight: axle4,
            telemetry: Telemetry::from(response),
            weighing_complete: false,
            start_time: None,
            end_time: None,
        }
    }

    fn unknown_vehicle(
        &mut self,
        response: &WagonResponse,
        detail: &WagonDetail,
        now: NaiveDateTime,
        outcome: &mut Outcome,
    ) {
        let mut record = self.build_record(response, detail);
        record.start_time = Some(self.start_time.clone());
        record.end_time = Some(timestamp(now));
        tracing::warn!("unknown vehicle at wagon {}", self.current);
        self.last = Some(Snapshot::Wagon(record.clone()));
        outcome.reports.push(Report::Wagon(record));
        outcome.commands.push(self.query());
    }

    // returns false if the wagon must be queried again
    fn weigh_wagon(
        &mut self,
        response: &WagonResponse,
        detail: &WagonDetail,
        now: NaiveDateTime,
        outcome: &mut Outcome,
    ) -> bool {
        let loco = detail.wagon_type.is_loco();
        let complete = if loco {
            self.loco_count += 1;
            true
        } else {
            detail.axles_ready()
        };

        tracing::info!("wagon {} axles: {:?}", self.current, detail.samples());

        let mut record = self.build_record(response, detail);
        if complete {
            record.start_time = Some(self.start_time.clone());
            record.end_time = Some(timestamp(now));
            record.weighing_complete = true;
        }
        self.last = Some(Snapshot::Wagon(record.clone()));

        if !complete || loco {
            outcome.reports.push(Report::Wagon(record.clone()));
            outcome.commands.extend(Self::status_reads());
        }

        if !complete {
            outcome.commands.push(self.query());
            return false;
        }

        self.started = true;
        if !loco {
            let serial = record.wagon_serial_number;
            self.records.insert(serial, record);
            // serials only grow, so a cursor on a missing record would never move again
            if !self
                .next_publish
                .is_some_and(|next| self.records.contains_key(&next))
            {
                self.next_publish = Some(serial);
            }
            outcome.completed = true;
        }

        tracing::info!("wagon {} complete", self.current);
        self.current = self.current.saturating_add(1);
        self.previous = self.previous.saturating_add(1);
        outcome.commands.extend(Self::status_reads());
        true
    }

    fn check_progress(&mut self, response: &WagonResponse, now: NaiveDateTime, outcome: &mut Outcome) {
        self.wagons_weighed = response.wagons_weighed;

        if response.wagons_weighed > self.previous && !self.started {
            outcome.clear_queue = true;
            self.start_time = timestamp(now);
            outcome.commands.push(self.query());
            if self.previous == 0 {
                self.previous = 1;
            }
        } else if response.wagons_weighed >= self.current && self.current == self.previous {
            self.start_time = timestamp(now);
            outcome.commands.push(self.query());
        } else {
            let telemetry = Telemetry::from(response);
            self.last = Some(Snapshot::Telemetry(telemetry));
            outcome.reports.push(Report::Telemetry(telemetry));
        }
    }
}
