use serde::{Deserialize, Serialize};

/// One row of `adb devices -l`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceSummary {
    pub serial: String,
    pub state: String,
    pub model: Option<String>,
}

impl DeviceSummary {
    pub fn is_online(&self) -> bool {
        self.state == "device"
    }
}
