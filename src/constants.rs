pub const DEFAULT_CLAIM_STATUS_API_URL: &str =
    "https://healthcare.us.stedi.com/change/medicalnetwork/claimstatus/v2";

pub const STEDI_API_DOC_URL: &str =
    "https://www.stedi.com/docs/api-reference/healthcare/post-healthcare-claims-status";
pub const STEDI_PAYER_NETWORK_URL: &str = "https://www.stedi.com/healthcare/network";

/// Row status text for records the payer network rejected outright.
pub const UNSUPPORTED_PAYER_STATUS: &str = "Payer not supported";

pub const API_KEY_ENV_VAR: &str = "STEDI_API_KEY";
