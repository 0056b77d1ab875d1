// Lifecheck Infrastructure - System Adapters
// Implements: ProcessTable, Terminator, ReadinessObserver, ControlSurface

pub mod control_surface;
pub mod process_table_impl;
pub mod readiness_observer_impl;
pub mod signal_terminator;

pub use control_surface::{CommandControlSurface, ControlSurfaceConfig};
pub use process_table_impl::SysinfoProcessTable;
pub use readiness_observer_impl::SystemReadinessObserver;
pub use signal_terminator::SignalTerminator;
