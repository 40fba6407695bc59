pub mod domain;
pub mod ports;

pub use domain::{
    Article, ArticleFilter, ArticleUpdate, Comment, DeviceInfo, NewArticle, NewComment,
    NewNotification, NewUser, Notification, NotificationKind, RefreshTokenRecord, Role, User,
};
pub use ports::{ContentStore, Mailer, PortError, PortResult};
