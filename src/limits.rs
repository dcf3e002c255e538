use crate::model::{Minutes, MINUTES_PER_DAY};

pub const MAX_TENANTS: usize = 1024;
pub const MAX_TENANT_NAME_LEN: usize = 128;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_SPECIALTY_LEN: usize = 256;
pub const MAX_EQUIPMENT_LEN: usize = 4096;

/// Weekly assignments on one room, across all days and states.
pub const MAX_ASSIGNMENTS_PER_ROOM: usize = 512;

pub const MIN_SLOT_MINUTES: Minutes = 1;
pub const MAX_SLOT_MINUTES: Minutes = MINUTES_PER_DAY;
