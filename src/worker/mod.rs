/// Worker module
///
/// This module groups the publish-cycle logic:
/// - `state`:  the rotation cursor over the currency table
/// - `runner`: the cycle loop (synthesize, publish, wait, cancel)
///
/// The worker sits between:
/// - The quote synthesizer (what to publish)
/// - A `Broker` (where to publish)
///
/// Broker-specific logic MUST NOT live here.
pub mod runner;
pub mod state;
