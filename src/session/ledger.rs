//! TipLedger - ordered, hash-deduplicated tip records for one session.
//!
//! Every insertion path goes through the hash index, so an event delivered
//! twice, an event racing an optimistic insert, and a backfill overlapping
//! the live subscription all converge on one record per transaction hash.

use alloy_primitives::{Address, B256, U256};
use serde::Serialize;

use crate::types::{Direction, TipEvent, TipRecord};
use crate::units::format_amount;

/// What a merge did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    /// An optimistic record was replaced by authoritative event data.
    Replaced,
    /// A record with the same hash already exists.
    Duplicate,
    /// The event does not involve the session address.
    Ignored,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool { matches!(self, MergeOutcome::Inserted | MergeOutcome::Replaced) }
}

#[derive(Debug, Clone, Default)]
pub struct TipLedger {
    records: Vec<TipRecord>,
}

impl TipLedger {
    pub fn new() -> Self { Self::default() }

    /// Newest first.
    pub fn records(&self) -> &[TipRecord] { &self.records }
    pub fn len(&self) -> usize { self.records.len() }
    pub fn is_empty(&self) -> bool { self.records.is_empty() }
    pub fn clear(&mut self) { self.records.clear(); }

    pub fn get(&self, hash: B256) -> Option<&TipRecord> {
        self.records.iter().find(|r| r.hash == Some(hash))
    }

    fn position(&self, hash: B256) -> Option<usize> {
        self.records.iter().position(|r| r.hash == Some(hash))
    }

    /// Insert keeping newest-first order; equal timestamps put the newcomer first.
    fn insert_sorted(&mut self, record: TipRecord) {
        let at = self.records.iter().position(|r| r.timestamp <= record.timestamp).unwrap_or(self.records.len());
        self.records.insert(at, record);
    }

    /// Merge a chain event relative to `me`.
    pub fn apply_event(&mut self, event: &TipEvent, me: Address) -> MergeOutcome {
        let Some(record) = TipRecord::from_event(event, me) else { return MergeOutcome::Ignored };
        match self.position(event.tx_hash) {
            Some(i) if self.records[i].is_optimistic() => {
                self.records.remove(i);
                self.insert_sorted(record);
                MergeOutcome::Replaced
            }
            Some(_) => MergeOutcome::Duplicate,
            None => {
                self.insert_sorted(record);
                MergeOutcome::Inserted
            }
        }
    }

    /// Add a locally built record. Skipped when its hash is already known.
    pub fn insert_optimistic(&mut self, record: TipRecord) -> MergeOutcome {
        if let Some(hash) = record.hash {
            if self.position(hash).is_some() {
                return MergeOutcome::Duplicate;
            }
        }
        self.insert_sorted(record);
        MergeOutcome::Inserted
    }

    /// Flag the record for `hash` as mined. Returns true if it changed.
    pub fn mark_confirmed(&mut self, hash: B256) -> bool {
        match self.position(hash) {
            Some(i) if !self.records[i].confirmed => {
                self.records[i].confirmed = true;
                true
            }
            _ => false,
        }
    }

    /// Drop the optimistic record for `hash`, e.g. after its transaction
    /// reverted. Records backed by a chain event are kept.
    pub fn discard_optimistic(&mut self, hash: B256) -> bool {
        match self.position(hash) {
            Some(i) if self.records[i].is_optimistic() => {
                self.records.remove(i);
                true
            }
            _ => false,
        }
    }

    /// Case-insensitive match on from/to addresses and message.
    pub fn search(&self, query: &str) -> Vec<TipRecord> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return self.records.clone();
        }
        self.records
            .iter()
            .filter(|r| {
                lower_hex(r.from).contains(&query)
                    || lower_hex(r.to).contains(&query)
                    || r.message.as_deref().is_some_and(|m| m.to_lowercase().contains(&query))
            })
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> TipSummary {
        TipSummary::from_records(&self.records)
    }
}

fn lower_hex(address: Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

/// Dashboard totals over the session's records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TipSummary {
    pub sent_count: usize,
    pub received_count: usize,
    pub total_sent: String,
    pub total_received: String,
    /// Received minus sent, signed display units.
    pub net: String,
    pub net_positive: bool,
    pub sent_percent: u8,
    pub received_percent: u8,
}

impl TipSummary {
    pub fn from_records(records: &[TipRecord]) -> Self {
        let (mut sent, mut received) = (U256::ZERO, U256::ZERO);
        let (mut sent_count, mut received_count) = (0, 0);
        for r in records {
            match r.direction {
                Direction::Sent => { sent += r.value; sent_count += 1; }
                Direction::Received => { received += r.value; received_count += 1; }
            }
        }
        let net_positive = received > sent;
        let net = if received >= sent {
            format_amount(received - sent)
        } else {
            format!("-{}", format_amount(sent - received))
        };
        let total = sent + received;
        let percent = |part: U256| -> u8 {
            if total.is_zero() { 0 } else { (part * U256::from(100u8) / total).to::<u8>() }
        };
        Self {
            sent_count,
            received_count,
            total_sent: format_amount(sent),
            total_received: format_amount(received),
            net,
            net_positive,
            sent_percent: percent(sent),
            received_percent: percent(received),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const ME: Address = address!("00000000000000000000000000000000000000aa");
    const PEER: Address = address!("00000000000000000000000000000000000000bb");

    fn ether(n: u64) -> U256 { U256::from(n) * U256::from(1_000_000_000_000_000_000u128) }

    fn event(hash: u8, from: Address, to: Address, amount: U256, ts: u64) -> TipEvent {
        TipEvent {
            tx_hash: B256::repeat_byte(hash),
            log_index: 0,
            block_number: 1,
            from,
            to,
            amount,
            message: format!("tip {hash}"),
            timestamp: ts,
        }
    }

    fn optimistic(hash: u8, ts: u64) -> TipRecord {
        TipRecord::optimistic(B256::repeat_byte(hash), ME, PEER, ether(1), Some("thanks".into()), ts)
    }

    #[test]
    fn same_hash_converges_in_any_order() {
        let ev = event(1, ME, PEER, ether(1), 100);

        let mut a = TipLedger::new();
        assert_eq!(a.insert_optimistic(optimistic(1, 105)), MergeOutcome::Inserted);
        assert_eq!(a.apply_event(&ev, ME), MergeOutcome::Replaced);
        assert_eq!(a.apply_event(&ev, ME), MergeOutcome::Duplicate);

        let mut b = TipLedger::new();
        assert_eq!(b.apply_event(&ev, ME), MergeOutcome::Inserted);
        assert_eq!(b.insert_optimistic(optimistic(1, 105)), MergeOutcome::Duplicate);
        assert_eq!(b.apply_event(&ev, ME), MergeOutcome::Duplicate);

        assert_eq!(a.len(), 1);
        assert_eq!(a.records(), b.records());
        assert!(a.records()[0].confirmed);
        assert!(!a.records()[0].is_optimistic());
    }

    #[test]
    fn keeps_newest_first() {
        let mut ledger = TipLedger::new();
        ledger.apply_event(&event(1, PEER, ME, ether(1), 100), ME);
        ledger.apply_event(&event(2, PEER, ME, ether(1), 300), ME);
        ledger.apply_event(&event(3, ME, PEER, ether(1), 200), ME);
        let ts: Vec<u64> = ledger.records().iter().map(|r| r.timestamp).collect();
        assert_eq!(ts, vec![300, 200, 100]);
    }

    #[test]
    fn ignores_unrelated_events() {
        let mut ledger = TipLedger::new();
        let stranger = address!("00000000000000000000000000000000000000cc");
        assert_eq!(ledger.apply_event(&event(1, PEER, stranger, ether(1), 1), ME), MergeOutcome::Ignored);
        assert!(ledger.is_empty());
    }

    #[test]
    fn confirmation_flag() {
        let mut ledger = TipLedger::new();
        ledger.insert_optimistic(optimistic(9, 1));
        assert!(ledger.mark_confirmed(B256::repeat_byte(9)));
        assert!(!ledger.mark_confirmed(B256::repeat_byte(9)));
        assert!(!ledger.mark_confirmed(B256::repeat_byte(8)));
    }

    #[test]
    fn discard_only_touches_optimistic_records() {
        let mut ledger = TipLedger::new();
        ledger.insert_optimistic(optimistic(4, 1));
        ledger.apply_event(&event(5, PEER, ME, ether(1), 2), ME);
        assert!(ledger.discard_optimistic(B256::repeat_byte(4)));
        assert!(!ledger.discard_optimistic(B256::repeat_byte(5)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn search_matches_addresses_and_messages() {
        let mut ledger = TipLedger::new();
        ledger.apply_event(&event(1, PEER, ME, ether(1), 1), ME);
        ledger.insert_optimistic(optimistic(2, 2));
        assert_eq!(ledger.search("THANKS").len(), 1);
        assert_eq!(ledger.search("00bb").len(), 2);
        assert_eq!(ledger.search("").len(), 2);
        assert!(ledger.search("nothing").is_empty());
    }

    #[test]
    fn summary_totals() {
        let mut ledger = TipLedger::new();
        ledger.apply_event(&event(1, PEER, ME, ether(3), 1), ME);
        ledger.apply_event(&event(2, ME, PEER, ether(1), 2), ME);
        let s = ledger.summary();
        assert_eq!(s.sent_count, 1);
        assert_eq!(s.received_count, 1);
        assert_eq!(s.total_received, "3.0");
        assert_eq!(s.net, "2.0");
        assert!(s.net_positive);
        assert_eq!(s.sent_percent, 25);
        assert_eq!(s.received_percent, 75);

        let empty = TipLedger::new().summary();
        assert_eq!(empty.net, "0.0");
        assert_eq!(empty.sent_percent, 0);
    }
}
