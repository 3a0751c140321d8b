pub mod record_detail;
pub mod records;
