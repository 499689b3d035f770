use std::fmt;
use std::io::Write;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::event::{Event, EventType};
use super::logs::{Log, TraceMetric};
use super::monitor::CheckIn;

/// Raised if a data category name is not known.
#[derive(Debug, Error)]
#[error("unknown data category")]
pub struct ParseDataCategoryError;

/// The category an item is rate limited and accounted under.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataCategory {
    /// Reserved category, applies to everything.
    Default,
    /// Error events.
    Error,
    /// Transactions.
    Transaction,
    /// Monitor check-ins.
    Monitor,
    /// Individual structured logs.
    LogItem,
    /// Individual trace metrics.
    TraceMetric,
}

impl DataCategory {
    /// The wire name of the category.
    pub fn as_str(self) -> &'static str {
        match self {
            DataCategory::Default => "default",
            DataCategory::Error => "error",
            DataCategory::Transaction => "transaction",
            DataCategory::Monitor => "monitor",
            DataCategory::LogItem => "log_item",
            DataCategory::TraceMetric => "trace_metric",
        }
    }
}

impl fmt::Display for DataCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataCategory {
    type Err = ParseDataCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "default" => DataCategory::Default,
            "error" => DataCategory::Error,
            "transaction" => DataCategory::Transaction,
            "monitor" => DataCategory::Monitor,
            "log_item" => DataCategory::LogItem,
            "trace_metric" => DataCategory::TraceMetric,
            _ => return Err(ParseDataCategoryError),
        })
    }
}

/// An Envelope Item.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum EnvelopeItem {
    /// An error or message event.
    Event(Event),
    /// A finished transaction.
    Transaction(Event),
    /// A monitor check-in.
    CheckIn(CheckIn),
    /// A batch of structured logs.
    Logs(Vec<Log>),
    /// A batch of trace metrics.
    Metrics(Vec<TraceMetric>),
}

impl EnvelopeItem {
    /// The category this item is accounted under.
    pub fn category(&self) -> DataCategory {
        match self {
            EnvelopeItem::Event(_) => DataCategory::Error,
            EnvelopeItem::Transaction(_) => DataCategory::Transaction,
            EnvelopeItem::CheckIn(_) => DataCategory::Monitor,
            EnvelopeItem::Logs(_) => DataCategory::LogItem,
            EnvelopeItem::Metrics(_) => DataCategory::TraceMetric,
        }
    }

    fn item_type(&self) -> &'static str {
        match self {
            EnvelopeItem::Event(_) => "event",
            EnvelopeItem::Transaction(_) => "transaction",
            EnvelopeItem::CheckIn(_) => "check_in",
            EnvelopeItem::Logs(_) => "log",
            EnvelopeItem::Metrics(_) => "trace_metric",
        }
    }
}

impl From<Event> for EnvelopeItem {
    fn from(mut event: Event) -> Self {
        match event.ty {
            EventType::Transaction => EnvelopeItem::Transaction(event),
            EventType::CheckIn => match event.check_in.take() {
                Some(check_in) => EnvelopeItem::CheckIn(check_in),
                None => EnvelopeItem::Event(event),
            },
            EventType::Default => EnvelopeItem::Event(event),
        }
    }
}

impl From<CheckIn> for EnvelopeItem {
    fn from(check_in: CheckIn) -> Self {
        EnvelopeItem::CheckIn(check_in)
    }
}

impl From<Vec<Log>> for EnvelopeItem {
    fn from(logs: Vec<Log>) -> Self {
        EnvelopeItem::Logs(logs)
    }
}

impl From<Vec<TraceMetric>> for EnvelopeItem {
    fn from(metrics: Vec<TraceMetric>) -> Self {
        EnvelopeItem::Metrics(metrics)
    }
}

#[derive(Serialize)]
struct ItemContainer<'a, T> {
    items: &'a [T],
}

/// An Envelope, the unit of delivery to the ingestion endpoint.
///
/// An envelope can contain multiple items. Each item is rate limited by its
/// [`DataCategory`], so an envelope may shrink before it is sent.
#[derive(Clone, Default, Debug, PartialEq)]
pub struct Envelope {
    event_id: Option<Uuid>,
    items: Vec<EnvelopeItem>,
}

impl Envelope {
    /// Creates a new empty Envelope.
    pub fn new() -> Envelope {
        Default::default()
    }

    /// Add a new Envelope Item.
    pub fn add_item<I>(&mut self, item: I)
    where
        I: Into<EnvelopeItem>,
    {
        let item = item.into();
        if self.event_id.is_none() {
            if let EnvelopeItem::Event(ref event) | EnvelopeItem::Transaction(ref event) = item {
                self.event_id = Some(event.event_id);
            }
        }
        self.items.push(item);
    }

    /// Create an [`Iterator`] over all the [`EnvelopeItem`]s.
    pub fn items(&self) -> impl Iterator<Item = &EnvelopeItem> {
        self.items.iter()
    }

    /// Returns the Envelope's Uuid, if any.
    pub fn uuid(&self) -> Option<&Uuid> {
        self.event_id.as_ref()
    }

    /// Returns the error [`Event`] contained in this Envelope, if any.
    pub fn event(&self) -> Option<&Event> {
        self.items.iter().find_map(|item| match item {
            EnvelopeItem::Event(event) => Some(event),
            _ => None,
        })
    }

    /// Returns the transaction contained in this Envelope, if any.
    pub fn transaction(&self) -> Option<&Event> {
        self.items.iter().find_map(|item| match item {
            EnvelopeItem::Transaction(event) => Some(event),
            _ => None,
        })
    }

    /// Returns `true` if the envelope has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Retains the [`EnvelopeItem`]s for which the predicate returns `true`.
    ///
    /// [`None`] is returned if no items remain in the Envelope after filtering.
    pub fn filter<P>(self, mut predicate: P) -> Option<Self>
    where
        P: FnMut(&EnvelopeItem) -> bool,
    {
        let mut filtered = Envelope::new();
        for item in self.items {
            if predicate(&item) {
                filtered.add_item(item);
            }
        }

        if filtered.is_empty() {
            None
        } else {
            Some(filtered)
        }
    }

    /// Serialize the Envelope into the given [`Write`].
    pub fn to_writer<W>(&self, mut writer: W) -> std::io::Result<()>
    where
        W: Write,
    {
        match self.uuid() {
            Some(uuid) => writeln!(writer, r#"{{"event_id":"{}"}}"#, uuid.as_simple())?,
            _ => writeln!(writer, "{{}}")?,
        }

        let mut item_buf = Vec::new();
        for item in &self.items {
            // items are buffered first, since the header needs their length
            match item {
                EnvelopeItem::Event(event) | EnvelopeItem::Transaction(event) => {
                    serde_json::to_writer(&mut item_buf, event)?
                }
                EnvelopeItem::CheckIn(check_in) => serde_json::to_writer(&mut item_buf, check_in)?,
                EnvelopeItem::Logs(logs) => {
                    serde_json::to_writer(&mut item_buf, &ItemContainer { items: logs })?
                }
                EnvelopeItem::Metrics(metrics) => {
                    serde_json::to_writer(&mut item_buf, &ItemContainer { items: metrics })?
                }
            }
            match item {
                EnvelopeItem::Logs(logs) => writeln!(
                    writer,
                    r#"{{"type":"log","item_count":{},"content_type":"application/vnd.sentry.items.log+json","length":{}}}"#,
                    logs.len(),
                    item_buf.len()
                )?,
                EnvelopeItem::Metrics(metrics) => writeln!(
                    writer,
                    r#"{{"type":"trace_metric","item_count":{},"content_type":"application/vnd.sentry.items.trace-metric+json","length":{}}}"#,
                    metrics.len(),
                    item_buf.len()
                )?,
                _ => writeln!(
                    writer,
                    r#"{{"type":"{}","length":{}}}"#,
                    item.item_type(),
                    item_buf.len()
                )?,
            }
            writer.write_all(&item_buf)?;
            writeln!(writer)?;
            item_buf.clear();
        }

        Ok(())
    }

    /// Serializes the Envelope into a byte buffer.
    pub fn to_vec(&self) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.to_writer(&mut buf)?;
        Ok(buf)
    }
}

impl<T> From<T> for Envelope
where
    T: Into<EnvelopeItem>,
{
    fn from(item: T) -> Self {
        let mut envelope = Self::default();
        envelope.add_item(item.into());
        envelope
    }
}

#[cfg(test)]
mod test {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::protocol::{CheckInStatus, LogLevel};

    fn to_str(envelope: Envelope) -> String {
        String::from_utf8(envelope.to_vec().unwrap()).unwrap()
    }

    #[test]
    fn test_empty() {
        assert_eq!(to_str(Envelope::new()), "{}\n");
    }

    #[test]
    fn test_event() {
        let event_id = Uuid::parse_str("22d00b3f-d1b1-4b5d-8d20-49d138cd8a9c").unwrap();
        let timestamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_595_256_674);
        let event = Event {
            event_id,
            timestamp,
            ..Default::default()
        };
        let envelope: Envelope = event.into();
        assert_eq!(
            to_str(envelope),
            r#"{"event_id":"22d00b3fd1b14b5d8d2049d138cd8a9c"}
{"type":"event","length":106}
{"event_id":"22d00b3fd1b14b5d8d2049d138cd8a9c","level":"error","platform":"native","timestamp":1595256674}
"#
        );
    }

    #[test]
    fn test_logs_header() {
        let mut log = Log::new(LogLevel::Info, "hi");
        log.timestamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1);
        let envelope: Envelope = vec![log.clone(), log].into();
        let out = to_str(envelope);
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("{}"));
        let header: serde_json::Value = serde_json::from_str(lines.next().unwrap()).unwrap();
        assert_eq!(header["type"], "log");
        assert_eq!(header["item_count"], 2);
        let payload: serde_json::Value = serde_json::from_str(lines.next().unwrap()).unwrap();
        assert_eq!(payload["items"][0]["body"], "hi");
        assert_eq!(payload["items"][1]["level"], "info");
    }

    #[test]
    fn test_transaction_and_check_in_routing() {
        let transaction = Event {
            ty: EventType::Transaction,
            ..Default::default()
        };
        assert!(matches!(
            EnvelopeItem::from(transaction),
            EnvelopeItem::Transaction(_)
        ));

        let check_in_event = Event {
            ty: EventType::CheckIn,
            check_in: Some(CheckIn::new("nightly", CheckInStatus::Ok)),
            ..Default::default()
        };
        let item = EnvelopeItem::from(check_in_event);
        assert_eq!(item.category(), DataCategory::Monitor);
    }

    #[test]
    fn test_filter() {
        let mut envelope = Envelope::new();
        envelope.add_item(Event::new());
        envelope.add_item(vec![Log::new(LogLevel::Warn, "x")]);

        let only_logs = envelope
            .clone()
            .filter(|item| item.category() == DataCategory::LogItem)
            .unwrap();
        assert_eq!(only_logs.items().count(), 1);
        assert!(only_logs.uuid().is_none());

        assert!(envelope.filter(|_| false).is_none());
    }
}
