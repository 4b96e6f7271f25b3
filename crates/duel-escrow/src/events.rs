//! # Escrow Events
//!
//! Each successful transition publishes its events, in order, after the
//! transition has committed. A failed operation publishes nothing.
//!
//! | Operation | Events |
//! |---|---|
//! | create | `AssetReceived`, `DuelCreated` |
//! | withdraw | `DuelWithdrawn` |
//! | join | `AssetReceived`, `DuelJoined` |
//! | resolve | `DuelEnded` |

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use duel_core::{Address, AssetId, DuelId};

/// An escrow event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EscrowEvent {
    /// An asset entered escrow custody for a duel.
    AssetReceived {
        /// The duel.
        duel_id: DuelId,
        /// Registry of the asset.
        registry: Address,
        /// The asset.
        asset_id: AssetId,
    },
    /// A duel was created.
    DuelCreated {
        /// The duel.
        duel_id: DuelId,
        /// Its creator.
        player1: Address,
    },
    /// A pending duel was withdrawn by its creator.
    DuelWithdrawn {
        /// The duel.
        duel_id: DuelId,
        /// Its creator.
        player1: Address,
    },
    /// A second player joined.
    DuelJoined {
        /// The duel.
        duel_id: DuelId,
        /// The challenger.
        player2: Address,
    },
    /// A duel was resolved.
    DuelEnded {
        /// The duel.
        duel_id: DuelId,
        /// Got their asset back.
        winner: Address,
        /// Asset burned.
        loser: Address,
    },
}

impl EscrowEvent {
    /// The duel this event concerns.
    pub fn duel_id(&self) -> DuelId {
        match self {
            Self::AssetReceived { duel_id, .. }
            | Self::DuelCreated { duel_id, .. }
            | Self::DuelWithdrawn { duel_id, .. }
            | Self::DuelJoined { duel_id, .. }
            | Self::DuelEnded { duel_id, .. } => *duel_id,
        }
    }

    /// Event name as it appears in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AssetReceived { .. } => "AssetReceived",
            Self::DuelCreated { .. } => "DuelCreated",
            Self::DuelWithdrawn { .. } => "DuelWithdrawn",
            Self::DuelJoined { .. } => "DuelJoined",
            Self::DuelEnded { .. } => "DuelEnded",
        }
    }
}

/// A published event with its escrow-wide sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Strictly increasing across all events of one escrow.
    pub sequence: u64,
    /// Publication time.
    pub emitted_at: DateTime<Utc>,
    /// The event.
    #[serde(flatten)]
    pub event: EscrowEvent,
}

/// Receives published events.
pub trait EventSink: Send + Sync {
    /// Accept one event.
    fn publish(&self, record: EventRecord);
}

/// Keeps every published event in memory.
#[derive(Debug, Default)]
pub struct EventLog {
    records: Mutex<Vec<EventRecord>>,
}

impl EventLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// A log pre-filled with earlier records.
    pub fn with_records(records: Vec<EventRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    /// All records, oldest first.
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().clone()
    }

    /// Events only, oldest first.
    pub fn events(&self) -> Vec<EscrowEvent> {
        self.records.lock().iter().map(|r| r.event.clone()).collect()
    }

    /// Events concerning one duel, oldest first.
    pub fn for_duel(&self, duel_id: DuelId) -> Vec<EscrowEvent> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.event.duel_id() == duel_id)
            .map(|r| r.event.clone())
            .collect()
    }

    /// Remove and return all records.
    pub fn drain(&self) -> Vec<EventRecord> {
        std::mem::take(&mut *self.records.lock())
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest sequence number recorded.
    pub fn last_sequence(&self) -> Option<u64> {
        self.records.lock().last().map(|r| r.sequence)
    }
}

impl EventSink for EventLog {
    fn publish(&self, record: EventRecord) {
        self.records.lock().push(record);
    }
}

/// Writes each event as an `info`-level tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, record: EventRecord) {
        tracing::info!(
            sequence = record.sequence,
            duel_id = %record.event.duel_id(),
            event = record.event.name(),
            "escrow event"
        );
    }
}
