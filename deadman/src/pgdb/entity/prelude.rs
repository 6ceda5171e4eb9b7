//! 预导入模块
//! Prelude module

pub use super::contacts::Entity as Contacts;
pub use super::emergency_probes::Entity as EmergencyProbes;
pub use super::jobs::Entity as Jobs;
pub use super::probe_settings::Entity as ProbeSettings;
pub use super::probes::Entity as Probes;
pub use super::users::Entity as Users;
