//! Node CPU monitoring.
//!
//! One agent per worker node samples container CPU counters from the local
//! runtime endpoint and ships them as UDP datagrams; a central server
//! validates the datagrams and republishes them onto the broker topic the
//! performance analyzer consumes.

pub mod agent;
pub mod server;
pub mod stats;
