pub mod clock;
pub mod error;
pub mod kind;
pub mod policy;
pub mod record;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::QuotaError;
pub use kind::QuotaKind;
pub use policy::{
    LimitPolicy, LimitPolicyResolver, StaticPolicyResolver, DEFAULT_POLICY,
    FAIR_USE_MESSAGES_POLICY,
};
pub use record::QuotaRecord;
pub use service::QuotaCheckService;

pub const FAIR_USE_MESSAGES_KIND: &str = "fair-use-messages";
