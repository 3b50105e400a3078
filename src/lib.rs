//! Invoice mailer: collects vendor invoice emails, renders them to PDF and
//! mails the PDFs out in one message.

pub mod config;
pub mod delivery;
pub mod error;
pub mod events;
pub mod mailbox;
pub mod naming;
pub mod pipeline;
pub mod render;
pub mod transform;
