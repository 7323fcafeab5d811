// Alert composition and delivery.
//
// Architecture:
// - composer.rs: Distress and movement-update message texts
// - segment.rs: Transport-sized segment splitting
// - fanout.rs: Per-contact normalization and submission

pub mod composer;
pub mod fanout;
pub mod segment;
