//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against the simulation backend.  All tests run on the host with no real
//! hardware required.

mod boundary_tests;
mod fan_manager_tests;
mod mock_hw;
