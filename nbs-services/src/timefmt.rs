/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use chrono::{DateTime, Duration, Local};
use tracing::warn;

/// The format used for every timestamp in the system.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// A timestamp string in the standard format, optionally `plus_seconds` in
/// the future.
pub fn get_timestamp(plus_seconds: i64) -> String {
    let then = Local::now() + Duration::seconds(plus_seconds);
    then.format(TIMESTAMP_FORMAT).to_string()
}

/// Seconds until the given timestamp string, 0 if it has passed or cannot be
/// parsed.
pub fn seconds_until(timestamp: &str) -> i64 {
    let then = match DateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT) {
        Ok(then) => then,
        Err(e) => {
            warn!("could not parse timestamp '{}': {}", timestamp, e);
            return 0;
        }
    };
    let delta = then.signed_duration_since(Local::now());
    delta.num_seconds().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_round_trip() {
        let stamp = get_timestamp(0);
        assert!(DateTime::parse_from_str(&stamp, TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn future_timestamps_count_down() {
        let stamp = get_timestamp(90);
        let remaining = seconds_until(&stamp);
        assert!(remaining > 80 && remaining <= 90, "remaining = {remaining}");
    }

    #[test]
    fn past_and_garbage_are_zero() {
        assert_eq!(seconds_until(&get_timestamp(-30)), 0);
        assert_eq!(seconds_until("not a timestamp"), 0);
    }
}
