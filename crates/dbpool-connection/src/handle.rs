//! Pooled connection handles
//!
//! A `PooledConnection` implements the native `Connection` trait, so callers
//! use it exactly like a driver connection. The handle adds the pool
//! lifecycle on top:
//!
//! - `close()` returns a pooled handle to its pool's idle queue, or destroys
//!   it when the pool is gone, destroyed or full
//! - every other call fails with `ConnectionClosed` once the handle is
//!   logically closed
//! - statements created through the handle get the target's statement
//!   options applied
//! - single-use handles (explicit credentials, no pool) are always
//!   destroyed on close
//!
//! # Example
//!
//! ```ignore
//! let conn = pool.acquire().await?;
//! let rows = conn.query("SELECT id FROM jobs", &[]).await?;
//! conn.close().await?;
//! assert!(conn.is_closed());
//! ```

mod state;
mod unpooled;
mod wrapper;


pub(crate) use state::HandleState;
pub use unpooled::connect_unpooled;
pub use wrapper::PooledConnection;
