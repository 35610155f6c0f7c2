pub mod clock;
pub mod performance;
pub mod task_queue;
pub mod thread_system;
pub mod worker_budget;
pub mod worker_pool;
