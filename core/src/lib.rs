/// PairChat Core - Two-party chat message synchronization engine
///
/// Reconciles three independently-arriving sources of truth per conversation
/// (live push channel, paginated pull API, persistent local cache) into one
/// gap-free, duplicate-free, time-ordered message list, surviving reconnects,
/// optimistic local sends and out-of-order delivery.

pub mod cache;
pub mod config;
pub mod error;
pub mod live;
pub mod merge;
pub mod message;
pub mod pagination;
pub mod session;
pub mod sync;

pub use cache::CacheStore;
pub use config::SyncConfig;
pub use error::{ChatError, Result};
pub use live::{ConnectionState, LiveConfig, LiveHandle, LiveSender};
pub use message::{ChatMessage, ConversationKey, MessageType};
pub use pagination::{HttpPageFetcher, PageFetcher, PageResponse, PaginationCursor};
pub use session::{Session, SessionHandle};
pub use sync::ConversationSynchronizer;
