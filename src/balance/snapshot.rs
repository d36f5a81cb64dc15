//! Balance Snapshot

use serde::Serialize;
use std::collections::BTreeMap;

use crate::engine::{BalanceBucket, TokenBalance};

/// Per-bucket token balances for one wallet. Every amount is strictly positive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BalanceSnapshot {
    buckets: BTreeMap<BalanceBucket, Vec<TokenBalance>>,
}

impl BalanceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `bucket` with the positive entries of `tokens`.
    ///
    /// Returns `false` (and leaves the snapshot untouched) when no entry is
    /// positive.
    pub fn apply(&mut self, bucket: BalanceBucket, tokens: &[TokenBalance]) -> bool {
        let positive = positive_tokens(tokens);
        if positive.is_empty() {
            return false;
        }
        self.buckets.insert(bucket, positive);
        true
    }

    pub fn get(&self, bucket: BalanceBucket) -> Option<&[TokenBalance]> {
        self.buckets.get(&bucket).map(Vec::as_slice)
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&BalanceBucket, &Vec<TokenBalance>)> {
        self.buckets.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of non-empty buckets
    pub fn len(&self) -> usize {
        self.buckets.len()
    }
}

/// Drop zero amounts
pub fn positive_tokens(tokens: &[TokenBalance]) -> Vec<TokenBalance> {
    tokens
        .iter()
        .filter(|t| t.amount > num_bigint::BigUint::ZERO)
        .cloned()
        .collect()
}
