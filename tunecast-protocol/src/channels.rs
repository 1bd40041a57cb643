//! Parsing for azap-compatible `channels.conf` files.
//!
//! Each line describes one channel:
//!
//! ```text
//! NAME:FREQUENCY:MODULATION:VIDEO_PID:AUDIO_PID:PROGRAM_ID
//! ```
//!
//! Files in this format can be generated with `w_scan2 -f a -c us -X`.

use std::io::BufRead;

use crate::error::ChannelsConfError;
use crate::types::{Channel, Modulation, CHANNEL_FIELD_COUNT};

/// Parse every channel from a `channels.conf` reader.
///
/// Any malformed line, including a blank one, fails the whole parse. Fields
/// are checked left to right and the first bad one is reported.
pub fn parse_channels_conf<R: BufRead>(reader: R) -> Result<Vec<Channel>, ChannelsConfError> {
    let mut channels = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|e| ChannelsConfError::Io(e.to_string()))?;
        channels.push(parse_channel_line(line_no, &line)?);
    }

    Ok(channels)
}

/// Format channels back into `channels.conf` text, one line each.
pub fn format_channels_conf(channels: &[Channel]) -> String {
    let mut out = String::new();
    for ch in channels {
        out.push_str(&ch.to_string());
        out.push('\n');
    }
    out
}

fn parse_channel_line(line_no: usize, line: &str) -> Result<Channel, ChannelsConfError> {
    let fields: Vec<&str> = line.split(':').collect();
    if fields.len() != CHANNEL_FIELD_COUNT {
        return Err(ChannelsConfError::FieldCount {
            line: line_no,
            found: fields.len(),
            expected: CHANNEL_FIELD_COUNT,
        });
    }

    let frequency = parse_unsigned(line_no, fields[1])?;
    let modulation: Modulation =
        fields[2]
            .parse()
            .map_err(|_| ChannelsConfError::UnknownModulation {
                line: line_no,
                value: fields[2].to_string(),
            })?;

    Ok(Channel {
        name: fields[0].to_string(),
        frequency,
        modulation,
        video_pid: parse_unsigned(line_no, fields[3])?,
        audio_pid: parse_unsigned(line_no, fields[4])?,
        program_id: parse_unsigned(line_no, fields[5])?,
    })
}

fn parse_unsigned<N: std::str::FromStr>(line_no: usize, value: &str) -> Result<N, ChannelsConfError> {
    let invalid = || ChannelsConfError::InvalidNumber {
        line: line_no,
        value: value.to_string(),
    };

    // str::parse accepts a leading '+', which channels.conf does not.
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    value.parse().map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const VALID_CHANNELS_CONF: &str = "KCTS-HD:189000000:8VSB:49:52:3
KIDS:189000000:8VSB:65:68:4
CREATE:189000000:8VSB:81:84:5
WORLD:189000000:8VSB:97:100:6";

    fn channel(name: &str, frequency: u64, modulation: Modulation, v: u32, a: u32, p: u32) -> Channel {
        Channel {
            name: name.to_string(),
            frequency,
            modulation,
            video_pid: v,
            audio_pid: a,
            program_id: p,
        }
    }

    fn parse(input: &str) -> Result<Vec<Channel>, ChannelsConfError> {
        parse_channels_conf(Cursor::new(input))
    }

    #[test]
    fn test_parse_valid_file() {
        let channels = parse(VALID_CHANNELS_CONF).unwrap();
        assert_eq!(
            channels,
            vec![
                channel("KCTS-HD", 189_000_000, Modulation::Vsb8, 49, 52, 3),
                channel("KIDS", 189_000_000, Modulation::Vsb8, 65, 68, 4),
                channel("CREATE", 189_000_000, Modulation::Vsb8, 81, 84, 5),
                channel("WORLD", 189_000_000, Modulation::Vsb8, 97, 100, 6),
            ]
        );
    }

    #[test]
    fn test_parse_modulation_variants() {
        let cases = [
            ("KCTS-HD:189000000:VSB_8:49:52:3", channel("KCTS-HD", 189_000_000, Modulation::Vsb8, 49, 52, 3)),
            ("Test QAM 64:255000000:QAM_64:42:43:5", channel("Test QAM 64", 255_000_000, Modulation::Qam64, 42, 43, 5)),
            ("WLFI:255000000:QAM_256:66:68:4", channel("WLFI", 255_000_000, Modulation::Qam256, 66, 68, 4)),
        ];

        for (input, want) in cases {
            assert_eq!(parse(input).unwrap(), vec![want], "input: {}", input);
        }
    }

    #[test]
    fn test_parse_rejects_blank_lines() {
        assert_eq!(
            parse("KIDS:189000000:8VSB:65:68:4\n\nWORLD:189000000:8VSB:97:100:6"),
            Err(ChannelsConfError::FieldCount { line: 2, found: 1, expected: 6 })
        );
        // A final newline does not start another line.
        assert_eq!(parse("KIDS:189000000:8VSB:65:68:4\n").unwrap().len(), 1);
    }

    #[test]
    fn test_first_bad_field_is_reported() {
        assert_eq!(
            parse("KIDS:lots:42VSB:65:68:4"),
            Err(ChannelsConfError::InvalidNumber { line: 1, value: "lots".to_string() })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse("KCTS-HD:189000000:8VSB:3"),
            Err(ChannelsConfError::FieldCount { line: 1, found: 4, expected: 6 })
        );
        assert!(matches!(
            parse("KCTS-HD:189.0123456:8VSB:49:52:3"),
            Err(ChannelsConfError::InvalidNumber { line: 1, .. })
        ));
        assert!(matches!(
            parse("KCTS-HD:189000000:42VSB:49:52:3"),
            Err(ChannelsConfError::UnknownModulation { line: 1, .. })
        ));
        assert!(matches!(
            parse("KCTS-HD:189000000:8VSB:49:52:?"),
            Err(ChannelsConfError::InvalidNumber { line: 1, .. })
        ));
        assert!(matches!(
            parse("KCTS-HD:+189000000:8VSB:49:52:3"),
            Err(ChannelsConfError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_error_reports_line_number() {
        let input = format!("{}\nBROKEN:1:8VSB", VALID_CHANNELS_CONF);
        let err = parse(&input).unwrap_err();
        assert_eq!(err, ChannelsConfError::FieldCount { line: 5, found: 3, expected: 6 });
        assert_eq!(err.to_string(), "channels.conf line 5 has 3 fields, expected 6");
    }

    #[test]
    fn test_format_reparses() {
        let channels = parse(VALID_CHANNELS_CONF).unwrap();
        let text = format_channels_conf(&channels);
        assert_eq!(parse(&text).unwrap(), channels);
    }
}
