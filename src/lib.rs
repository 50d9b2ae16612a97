//! salt-describe - Describe the live state of managed minions
//!
//! This crate queries minions through the salt master for one category of
//! state at a time (pip libraries, firewalld zones, timezone, ...) and
//! writes the result back out as Salt states or Ansible playbooks.

pub mod config;
pub mod describe;
pub mod generate;
pub mod remote;
