pub mod autocall;
pub mod channel;
pub mod config;
pub mod engine;
pub mod lifecycle;
pub mod metrics;
pub mod notify;
pub mod patient;
pub mod scheduler;
pub mod testing;
pub mod ticket;

pub use autocall::{AutoCallConfig, AutoCaller};
pub use channel::{
    Channel, ChannelError, ChannelStore, NewChannel, OperatingStatus, SqliteChannelStore,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, LogFormat,
    SanitizedConfig,
};
pub use engine::{
    ChannelView, EngineConfig, EngineError, EnrollRequest, QueueEngine, QueueEvent,
    StoreRetryConfig,
};
pub use lifecycle::{SkipPolicy, TicketAction};
pub use notify::{
    create_announcer, create_notification_system, AnnounceError, AnnounceRequest, Announcement,
    Announcer, DispatchWorker, LogAnnouncer, NotificationHandle, NotifierBackend, NotifierConfig,
    WebhookAnnouncer,
};
pub use patient::{HttpPatientDirectory, PatientDirectory, PatientError, PatientInfo, PatientsConfig};
pub use ticket::{
    format_queue_label, PriorityTier, SqliteTicketStore, Ticket, TicketError, TicketFilter,
    TicketStatus, TicketStore,
};
