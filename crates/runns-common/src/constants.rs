//! Process-wide constants and well-known paths.

/// Directory holding one PID file per running container.
pub const REGISTRY_DIR: &str = "/run/runns";

/// Runtime spec filename, read from the launching invocation's cwd.
pub const SPEC_FILE: &str = "config.json";

/// Environment variable carrying the serialized spec from parent to child.
pub const SPEC_ENV: &str = "_LIBCONTAINER_SPEC";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "runns";
