//! CNAB return-file reconciliation for a fleet-tracking billing subsystem:
//! parses bank return files, replays each reported occurrence against the
//! internal payment state machine inside one transaction, journals every
//! occurrence, schedules customer notifications through a mail outbox, and
//! generates the outbound shipping files that place titles in collection.

pub mod billet;
pub mod classifier;
pub mod cnab;
pub mod config;
pub mod db;
pub mod engine;
pub mod mailer;
pub mod model;
pub mod outbox;
pub mod processor;
pub mod resolver;
