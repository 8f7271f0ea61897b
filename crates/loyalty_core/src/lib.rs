pub mod checkin;
pub mod codec;
pub mod domain;
pub mod endpoints;
pub mod guard;
pub mod ports;
pub mod progress;
pub mod session;
pub mod token;

pub use checkin::{CheckinError, CheckinInput, CheckinOrchestrator, CheckinPhase, CheckinSuccess};
pub use codec::{CodecError, DecodedCheckin, PayloadSource};
pub use domain::{
    Business, ContactQuery, Credentials, Customer, CustomerTag, LoginGrant, ProgressSnapshot,
    Reward, RewardStatus, Role, Session, Visit, VisitReceipt,
};
pub use endpoints::{Capability, EndpointError, EndpointMap};
pub use guard::{authorize, Authorization, RoleSet, UNAUTHORIZED_ROUTE};
pub use ports::{LoyaltyBackend, PortError, PortResult, SessionStorage};
pub use progress::{cycle_position, Badges, ProgressTarget, ProgressView, PunchCell};
pub use session::{AuthFailure, SessionError, SessionPhase, SessionStore, LOGIN_ROUTE};
