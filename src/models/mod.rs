// 数据模型模块

pub mod host_key;
pub mod settings;
pub mod target;

pub use host_key::{HostKey, ObservedKey};
pub use settings::HarvestSettings;
pub use target::Target;
