use async_trait::async_trait;
use serde_json::Value;

/// The generic `/replication/v1/*` configuration surface (workers, controllers, requests, jobs,
/// config CRUD). Out of scope for this implementation: this trait documents the contract a
/// future implementation would satisfy, without providing one — the HTTP config editor behind
/// it is not reimplemented here.
#[async_trait]
pub trait AdminApi: Send + Sync {
    async fn list_workers(&self) -> Value;
    async fn worker_status(&self, name: &str) -> Option<Value>;
    async fn list_controllers(&self) -> Value;
    async fn controller_info(&self, id: &str) -> Option<Value>;
    async fn list_requests(&self) -> Value;
    async fn request_info(&self, id: &str) -> Option<Value>;
    async fn list_jobs(&self) -> Value;
    async fn job_info(&self, id: &str) -> Option<Value>;
    async fn get_config(&self) -> Value;
    async fn add_worker_config(&self, worker: Value) -> Result<(), String>;
    async fn delete_worker_config(&self, name: &str) -> Result<(), String>;
    async fn add_family_config(&self, family: Value) -> Result<(), String>;
    async fn delete_family_config(&self, name: &str) -> Result<(), String>;
    async fn add_database_config(&self, database: Value) -> Result<(), String>;
    async fn delete_database_config(&self, name: &str) -> Result<(), String>;
    async fn add_table_config(&self, table: Value) -> Result<(), String>;
    async fn delete_table_config(&self, name: &str) -> Result<(), String>;
}
