//! 文档数据库模块
//!
//! 定义同步引擎依赖的文档数据库接口及其实现

pub mod firestore;
pub mod memory;
pub mod store;

// 重新导出主要类型
pub use firestore::FirestoreClient;
pub use memory::MemoryDocumentStore;
pub use store::{DocumentSnapshot, DocumentStore, Fields, WriteFields, WriteValue};
