//! Behavioral constants for queries and charts.

use crate::query::SortOrder;

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_RANGE_DAYS: i64 = 30;
pub const DEFAULT_SORT_COLUMN: &str = "timestamp";
pub const DEFAULT_SORT_ORDER: SortOrder = SortOrder::Desc;
pub const PAGE_SIZE_CHOICES: &[u32] = &[20, 50, 100, 200];

/// Number of field values charted individually before folding into "Other".
pub const TOP_N_VALUES: usize = 10;

/// Value buttons shown per filter column; the rest are reachable by search.
pub const MAX_VALUE_BUTTONS: usize = 40;
