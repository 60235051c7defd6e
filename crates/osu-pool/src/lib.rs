//! Credential pool for the osu! stats API
//!
//! Multiplexes profile lookups across several API applications. Each
//! credential has a per-window request quota and an error-budget circuit
//! breaker; the pool picks the least-loaded usable credential, the broker
//! caches its bearer token, and the fetch client classifies each lookup.
//!
//! Credential lifecycle:
//! 1. Configuration provisions the credential → `Active`, empty window
//! 2. Pool selects it least-loaded-first while it has window capacity
//! 3. Token exchange and profile lookups each consume one quota unit
//! 4. Non-2xx/network failures are recorded; 3 within 900s → `Suspended`
//! 5. Errors age out of the window → next evaluation returns it to `Active`

pub mod broker;
pub mod clock;
pub mod error;
pub mod fetch;
pub mod pool;

pub use broker::TokenBroker;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use fetch::{FetchClient, Fetched};
pub use pool::{CredentialPool, CredentialState, PoolLimits, RetryPolicy};
