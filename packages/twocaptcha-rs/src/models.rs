use serde::Deserialize;

/// Response shape shared by the 2Captcha `in.php` and `res.php` endpoints
/// when called with `json=1`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    pub status: i32,
    pub request: String,
}

impl ApiResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 1
    }

    /// `res.php` answers `CAPCHA_NOT_READY` (sic) while the challenge is
    /// still being worked on.
    pub fn is_pending(&self) -> bool {
        self.status == 0 && self.request == "CAPCHA_NOT_READY"
    }
}
