//! GRBL Status Report Parsing
//!
//! Decodes `<State|MPos:...|WPos:...|WCO:...|Bf:...|FS:...|Ov:...|Pn:...|A:...|Ln:...>`
//! into a [`StatusReport`]. Fields the report mask leaves out stay `None`;
//! fields this parser does not know are skipped.

use gcodelink_core::{BufferState, ControllerState, Overrides, Position, ProtocolError, StatusReport};
use tracing::trace;

/// Map a GRBL state name (without sub-state) to a controller state
pub fn parse_state(name: &str) -> Option<ControllerState> {
    match name {
        "Idle" => Some(ControllerState::Idle),
        "Run" => Some(ControllerState::Run),
        "Hold" => Some(ControllerState::Hold),
        "Jog" => Some(ControllerState::Jog),
        "Alarm" => Some(ControllerState::Alarm),
        "Door" => Some(ControllerState::Door),
        "Check" => Some(ControllerState::Check),
        "Home" => Some(ControllerState::Home),
        "Sleep" => Some(ControllerState::Sleep),
        _ => None,
    }
}

fn parse_position(text: &str) -> Option<Position> {
    let mut coords = text.split(',').map(|s| s.trim().parse::<f64>());
    let x = coords.next()?.ok()?;
    let y = coords.next()?.ok()?;
    let z = coords.next()?.ok()?;
    Some(Position::new(x, y, z))
}

fn parse_numbers<const N: usize>(text: &str) -> Option<[f64; N]> {
    let mut out = [0.0; N];
    let mut parts = text.split(',');
    for slot in out.iter_mut() {
        *slot = parts.next()?.trim().parse::<f64>().ok()?;
    }
    Some(out)
}

/// Parse a full status report line including the angle brackets
pub fn parse_status_report(line: &str) -> Result<StatusReport, ProtocolError> {
    let malformed = || ProtocolError::MalformedStatus {
        line: line.to_string(),
    };

    let body = line
        .trim()
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .ok_or_else(malformed)?;

    let mut fields = body.split('|');
    let state_field = fields.next().map(str::trim).unwrap_or_default();
    let (name, substate) = match state_field.split_once(':') {
        Some((name, sub)) => (name, sub.parse::<u8>().ok()),
        None => (state_field, None),
    };
    let state = parse_state(name).ok_or_else(|| ProtocolError::UnknownState {
        state: name.to_string(),
    })?;

    let mut report = StatusReport::new(state);
    report.substate = substate;

    for field in fields {
        let field = field.trim();
        let Some((key, value)) = field.split_once(':') else {
            trace!("Skipping status field without value: {}", field);
            continue;
        };
        match key {
            "MPos" => report.mpos = Some(parse_position(value).ok_or_else(malformed)?),
            "WPos" => report.wpos = Some(parse_position(value).ok_or_else(malformed)?),
            "WCO" => report.wco = Some(parse_position(value).ok_or_else(malformed)?),
            "Bf" | "Buf" => {
                let [planner, rx] = parse_numbers::<2>(value).ok_or_else(malformed)?;
                report.buffer = Some(BufferState {
                    planner: planner as u32,
                    rx: rx as u32,
                });
            }
            "FS" => {
                let [feed, speed] = parse_numbers::<2>(value).ok_or_else(malformed)?;
                report.feed_rate = Some(feed);
                report.spindle_speed = Some(speed);
            }
            "F" => {
                let [feed] = parse_numbers::<1>(value).ok_or_else(malformed)?;
                report.feed_rate = Some(feed);
            }
            "Ov" => {
                let [feed, rapid, spindle] = parse_numbers::<3>(value).ok_or_else(malformed)?;
                report.overrides = Some(Overrides {
                    feed: feed as u32,
                    rapid: rapid as u32,
                    spindle: spindle as u32,
                });
            }
            "Pn" => report.pins = Some(value.to_string()),
            "A" => report.accessory = Some(value.to_string()),
            "Ln" => report.line = value.trim().parse::<u32>().ok(),
            _ => trace!("Skipping status field {}", key),
        }
    }

    Ok(report)
}
