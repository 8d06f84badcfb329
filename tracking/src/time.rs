pub trait TimeSource {
    // Return the current epoch time in milliseconds
    fn now_millis(&self) -> i64;
}

#[derive(Clone, Default)]
pub struct SystemTime {}

impl TimeSource for SystemTime {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
