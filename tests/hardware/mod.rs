//! Hardware-specific tests requiring real serial devices.
//!
//! These tests are ignored by default and require actual hardware to run.
//! Set `TEST_PORT` (and optionally `TEST_BAUD`, `TEST_COMMAND`) first.
