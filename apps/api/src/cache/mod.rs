// Fast ephemeral store backing the workspace cache, the visit buffer and
// the flush lease. All callers depend on the `FastStore` trait, never on
// the Redis client directly.

pub mod store;

#[cfg(test)]
pub mod memory;
