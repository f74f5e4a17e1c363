//! Cost-bounded consumption of scan results.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One row produced by the external scan primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRow {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl ScanRow {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Cost function charging one unit per mapped row.
pub fn unit_cost<T>(_: &T) -> usize {
    1
}

/// Maps rows until their summed cost reaches `limit`.
///
/// The row that crosses the limit is kept, so the result may overshoot by
/// one row's cost. A limit of zero still yields the first row.
#[derive(Debug, Clone)]
pub struct LimitCollector<F> {
    limit: usize,
    cost: F,
}

impl<F> LimitCollector<F> {
    pub fn new(limit: usize, cost: F) -> Self {
        Self { limit, cost }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Consumes `rows` lazily through `mapper`.
    ///
    /// `on_last_row` runs once with the last row touched and its mapped value
    /// so the caller can resume after it; it does not run when there were no
    /// rows or when `mapper` fails.
    pub fn collect<T, I, M, L>(&self, rows: I, mut mapper: M, on_last_row: L) -> Result<Vec<T>>
    where
        F: Fn(&T) -> usize,
        I: IntoIterator<Item = ScanRow>,
        M: FnMut(&ScanRow) -> Result<T>,
        L: FnOnce(&ScanRow, &T),
    {
        let mut results = Vec::new();
        let mut total = 0usize;
        let mut last_row: Option<ScanRow> = None;
        let mut reached = false;

        for row in rows {
            let mapped = mapper(&row)?;
            total = total.saturating_add((self.cost)(&mapped));
            results.push(mapped);
            last_row = Some(row);
            if total >= self.limit {
                reached = true;
                break;
            }
        }

        if let (Some(row), Some(last)) = (last_row.as_ref(), results.last()) {
            on_last_row(row, last);
        }
        tracing::debug!(
            rows = results.len(),
            cost = total,
            limit = self.limit,
            reached,
            "bounded scan finished"
        );
        Ok(results)
    }
}
