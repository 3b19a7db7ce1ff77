//! Domain layer: the entities of the enrollment workflow and the ports the
//! application layer depends on.

pub mod course;
pub mod enrollment;
pub mod money;
pub mod notification;
pub mod payment;
pub mod ports;
