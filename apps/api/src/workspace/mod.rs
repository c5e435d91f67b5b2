// Workspace subsystem: the ephemeral edit-session store, the persistence
// queue, and the background worker that turns saved sessions into durable
// prompt records.

pub mod handlers;
pub mod models;
pub mod prompts;
pub mod queue;
pub mod store;
pub mod worker;
