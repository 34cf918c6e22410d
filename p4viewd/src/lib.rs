pub mod daemon;
pub mod dbus_api;
pub mod events;
pub mod p4;
