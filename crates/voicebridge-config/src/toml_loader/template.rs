//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# voicebridge configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[connection]
# ready_timeout_ms = 30000     # 1000-120000
# recovery_window_ms = 5000    # 100-60000

[bridge]
# silence_ms = 200             # 20-5000, trailing silence that ends a relay
# gain = 1.0                   # 0.0-2.0

[cues]
# enabled = true
# volume = 0.3                 # 0.0-1.0

[presence]
# enabled = true
# idle_text = "No active voice chats"

[scheduler]
# voice_check_minutes = 2      # 1-1440
# registry_reload_minutes = 1  # 1-1440
# run_on_start = true

[logging]
# level = "info"               # trace, debug, info, warn, error
"##
    .to_string()
}
