//! GRBL Error and Alarm Code Decoder
//! Converts numeric error and alarm codes to human-readable messages

/// Error code GRBL returns for G-code sent while alarm-locked.
pub const ERROR_ALARM_LOCK: u32 = 9;

/// Decode GRBL error code to human-readable message
pub fn decode_error(code: u32) -> String {
    let text = match code {
        1 => "Expected command letter",
        2 => "Bad number format",
        3 => "Invalid '$' statement",
        4 => "Negative value",
        5 => "Homing not enabled",
        6 => "Step pulse too short",
        7 => "EEPROM read failed",
        8 => "'$' command requires Idle state",
        9 => "G-code locked out during alarm or jog",
        10 => "Soft limits require homing",
        11 => "Line too long",
        12 => "Step rate too high",
        13 => "Safety door open",
        14 => "Build info or startup line too long",
        15 => "Jog target exceeds machine travel",
        16 => "Invalid jog command",
        17 => "Laser mode requires PWM output",
        20 => "Unsupported G-code",
        21 => "Conflicting modal group",
        22 => "Feed rate undefined",
        23 => "Command requires an integer value",
        24 => "Two commands need axis words",
        25 => "Repeated word",
        26 => "Missing axis words",
        27 => "Line number out of range",
        28 => "Missing P or L value",
        29 => "Unsupported work coordinate system",
        30 => "G53 requires G0 or G1",
        31 => "Unused axis words",
        32 => "Arc without axis words in plane",
        33 => "Invalid motion target",
        34 => "Arc radius error",
        35 => "Arc missing IJK offset in plane",
        36 => "Unused words",
        37 => "Tool length offset axis mismatch",
        38 => "Tool number out of range",
        _ => return format!("Unknown error code: {}", code),
    };
    text.to_string()
}

/// Decode GRBL alarm code to human-readable message
pub fn decode_alarm(code: u32) -> String {
    let text = match code {
        1 => "Hard limit triggered",
        2 => "Soft limit: motion target exceeds machine travel",
        3 => "Reset while in motion; position lost",
        4 => "Probe fail: probe not in expected initial state",
        5 => "Probe fail: no contact within travel",
        6 => "Homing fail: reset during homing cycle",
        7 => "Homing fail: safety door opened during homing",
        8 => "Homing fail: could not clear limit switch",
        9 => "Homing fail: limit switch not found",
        10 => "Homing fail: second dual axis switch not found",
        _ => return format!("Unknown alarm code: {}", code),
    };
    text.to_string()
}

/// Format error message with code and description
pub fn format_error(code: u32) -> String {
    format!("error:{} - {}", code, decode_error(code))
}

/// Format alarm message with code and description
pub fn format_alarm(code: u32) -> String {
    format!("ALARM:{} - {}", code, decode_alarm(code))
}

/// Whether an `error:` response means the machine is effectively alarmed
///
/// Numbered errors are fatal only for the alarm lock-out. Legacy textual
/// errors are fatal when they mention an alarm, a limit or an emergency
/// stop.
pub fn is_fatal_error(code: Option<u32>, text: &str) -> bool {
    match code {
        Some(code) => code == ERROR_ALARM_LOCK,
        None => {
            let lower = text.to_ascii_lowercase();
            ["alarm", "limit", "emergency"]
                .iter()
                .any(|needle| lower.contains(needle))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error() {
        assert_eq!(decode_error(2), "Bad number format");
        assert_eq!(decode_error(9), "G-code locked out during alarm or jog");
        assert!(decode_error(255).contains("Unknown error code"));
    }

    #[test]
    fn test_decode_alarm() {
        assert!(decode_alarm(1).contains("Hard limit"));
        assert!(decode_alarm(2).contains("Soft limit"));
        assert!(decode_alarm(99).contains("Unknown alarm code"));
    }

    #[test]
    fn test_format() {
        assert!(format_error(20).starts_with("error:20 - Unsupported"));
        assert!(format_alarm(1).starts_with("ALARM:1 - Hard limit"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(is_fatal_error(Some(9), "error:9"));
        assert!(!is_fatal_error(Some(20), "error:20"));
        assert!(!is_fatal_error(Some(10), "error:10"));
        assert!(is_fatal_error(None, "error: Alarm lock"));
        assert!(is_fatal_error(None, "error: Hard limit hit"));
        assert!(!is_fatal_error(None, "error: Bad number format"));
    }
}
