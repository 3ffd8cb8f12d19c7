use crate::config::SoundKind;
use crate::error::{Result, StemflowError};
use crate::music::PauseBehavior;
use crate::playback::{LoopWindow, TransitionPolicy};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Stream and state tables of one music state machine.
///
/// Deserialises from
///
/// ```json
/// {
///   "url": "audio/bgm/battle/",
///   "streams": { "main": { "loop": [4.2, 62.0], "trans": "cut" } },
///   "states": { "main": { "triggers": ["start"], "streams": ["main@100"], "next": [] } }
/// }
/// ```
///
/// State declaration order is preserved: it decides which state wins when several
/// match the same trigger.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicConfig {
    #[serde(default)]
    pub id: String,
    /// Base URL for streams that do not name their own.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<SoundKind>,
    pub streams: BTreeMap<String, StreamConfig>,
    #[serde(deserialize_with = "ordered_states")]
    pub states: Vec<(String, StateConfig)>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamConfig {
    #[serde(default)]
    pub url: Option<String>,
    /// `[start, end]` pair, the compact form of `loopStart`/`loopEnd`.
    #[serde(default, rename = "loop")]
    pub loop_points: Option<(f64, f64)>,
    #[serde(default)]
    pub loop_start: Option<f64>,
    #[serde(default)]
    pub loop_end: Option<f64>,
    #[serde(default, alias = "trans")]
    pub transition_policy: TransitionPolicy,
    /// Beat length in seconds, required by `cut-on-beat`.
    #[serde(default)]
    pub beat: Option<f64>,
    #[serde(default)]
    pub beat_offset: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateConfig {
    #[serde(default)]
    pub triggers: Vec<String>,
    /// `"streamId@volume"` references, volume 0..=100.
    #[serde(default)]
    pub streams: Vec<String>,
    #[serde(default, alias = "next")]
    pub allowed_next: Vec<String>,
    #[serde(default)]
    pub pause: PauseBehavior,
    #[serde(default)]
    pub disable_in_replay: bool,
}

impl MusicConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Checks referential integrity and every per-stream/per-state field.
    pub fn validate(&self) -> Result<()> {
        for (id, stream) in &self.streams {
            stream.resolved_url(id, self.url.as_deref())?;
            stream.loop_window()?;
            if stream.transition_policy == TransitionPolicy::CutOnBeat
                && stream.beat.is_none_or(|beat| beat <= 0.0)
            {
                return Err(StemflowError::Configuration(format!(
                    "stream '{}' uses cut-on-beat without a positive beat",
                    id
                )));
            }
        }

        let mut seen = HashSet::new();
        for (id, state) in &self.states {
            if !seen.insert(id.as_str()) {
                return Err(StemflowError::Configuration(format!(
                    "state '{}' is declared twice",
                    id
                )));
            }
            for (stream_id, _) in state.stream_refs()? {
                if !self.streams.contains_key(&stream_id) {
                    return Err(StemflowError::Configuration(format!(
                        "state '{}' references undeclared stream '{}'",
                        id, stream_id
                    )));
                }
            }
        }

        for (id, state) in &self.states {
            for next in &state.allowed_next {
                if !seen.contains(next.as_str()) {
                    return Err(StemflowError::Configuration(format!(
                        "state '{}' allows transition to undeclared state '{}'",
                        id, next
                    )));
                }
            }
        }

        Ok(())
    }
}

impl StreamConfig {
    /// The stream's own URL, or `<base><id>.mp3`.
    pub fn resolved_url(&self, id: &str, base: Option<&str>) -> Result<String> {
        match (&self.url, base) {
            (Some(url), _) => Ok(url.clone()),
            (None, Some(base)) => Ok(format!("{}{}.mp3", base, id)),
            (None, None) => Err(StemflowError::Configuration(format!(
                "stream '{}' has no url and the music config has no base url",
                id
            ))),
        }
    }

    pub fn loop_window(&self) -> Result<Option<LoopWindow>> {
        let (start, end) = match self.loop_points {
            Some(points) => points,
            None => (
                self.loop_start.unwrap_or(0.0),
                self.loop_end.unwrap_or(0.0),
            ),
        };
        LoopWindow::from_points(start, end)
    }
}

impl StateConfig {
    pub fn stream_refs(&self) -> Result<Vec<(String, u8)>> {
        self.streams.iter().map(|s| parse_stream_ref(s)).collect()
    }
}

/// Parses `"streamId@volume"`. A missing `@volume` means full volume.
pub fn parse_stream_ref(reference: &str) -> Result<(String, u8)> {
    let (id, volume) = match reference.split_once('@') {
        Some((id, volume)) => {
            let volume: u8 = volume.trim().parse().map_err(|_| {
                StemflowError::Configuration(format!(
                    "invalid volume in stream reference '{}'",
                    reference
                ))
            })?;
            (id.trim(), volume)
        }
        None => (reference.trim(), 100),
    };

    if id.is_empty() {
        return Err(StemflowError::Configuration(format!(
            "empty stream id in reference '{}'",
            reference
        )));
    }
    if volume > 100 {
        return Err(StemflowError::Configuration(format!(
            "volume {} out of range in reference '{}'",
            volume, reference
        )));
    }
    Ok((id.to_string(), volume))
}

fn ordered_states<'de, D>(deserializer: D) -> std::result::Result<Vec<(String, StateConfig)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OrderedStates;

    impl<'de> Visitor<'de> for OrderedStates {
        type Value = Vec<(String, StateConfig)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of state id to state definition")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut states = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry::<String, StateConfig>()? {
                states.push(entry);
            }
            Ok(states)
        }
    }

    deserializer.deserialize_map(OrderedStates)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BATTLE: &str = r#"{
        "url": "audio/bgm/gym/",
        "streams": {
            "main": { "loop": [4.0, 64.0], "trans": "cut" },
            "drums": { "loopStart": 4.0, "loopEnd": 64.0, "transitionPolicy": "cut-on-beat", "beat": 0.5 },
            "win": { "url": "audio/bgm/victory.mp3", "loop": [0.0, 0.0], "trans": "fade-out" }
        },
        "states": {
            "main": { "triggers": ["start"], "streams": ["main@100", "drums@40"], "next": ["win"], "pause": "pause" },
            "win": { "triggers": ["win", "tie"], "streams": ["win"], "next": [] }
        }
    }"#;

    #[test]
    fn parses_and_validates_table_format() {
        let config = MusicConfig::from_json(BATTLE).unwrap();
        config.validate().unwrap();

        let ids: Vec<_> = config.states.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["main", "win"]);

        let main = &config.states[0].1;
        assert_eq!(main.allowed_next, ["win"]);
        assert_eq!(
            main.stream_refs().unwrap(),
            [("main".to_string(), 100), ("drums".to_string(), 40)]
        );
        assert_eq!(config.states[1].1.stream_refs().unwrap()[0].1, 100);

        let drums = &config.streams["drums"];
        assert_eq!(drums.transition_policy, TransitionPolicy::CutOnBeat);
        assert_eq!(
            drums.resolved_url("drums", config.url.as_deref()).unwrap(),
            "audio/bgm/gym/drums.mp3"
        );
        assert!(config.streams["win"].loop_window().unwrap().is_none());
    }

    #[test]
    fn state_order_follows_declaration_not_alphabet() {
        let json = r#"{"streams":{},"states":{"zeta":{},"alpha":{}}}"#;
        let config = MusicConfig::from_json(json).unwrap();
        assert_eq!(config.states[0].0, "zeta");
        assert_eq!(config.states[1].0, "alpha");
    }

    #[test]
    fn rejects_undeclared_stream() {
        let json = r#"{"url":"x/","streams":{"a":{}},"states":{"s":{"streams":["b@50"]}}}"#;
        let err = MusicConfig::from_json(json).unwrap().validate().unwrap_err();
        assert!(matches!(err, StemflowError::Configuration(msg) if msg.contains("'b'")));
    }

    #[test]
    fn rejects_undeclared_next_state() {
        let json = r#"{"url":"x/","streams":{},"states":{"s":{"next":["t"]}}}"#;
        assert!(MusicConfig::from_json(json).unwrap().validate().is_err());
    }

    #[test]
    fn rejects_beatless_cut_on_beat() {
        let json = r#"{"url":"x/","streams":{"a":{"trans":"cut-on-beat"}},"states":{}}"#;
        assert!(MusicConfig::from_json(json).unwrap().validate().is_err());
    }

    #[test]
    fn rejects_stream_without_any_url() {
        let json = r#"{"streams":{"a":{}},"states":{}}"#;
        assert!(MusicConfig::from_json(json).unwrap().validate().is_err());
    }

    #[test]
    fn stream_ref_parsing() {
        assert_eq!(parse_stream_ref("main@75").unwrap(), ("main".to_string(), 75));
        assert_eq!(parse_stream_ref("main").unwrap(), ("main".to_string(), 100));
        assert!(parse_stream_ref("main@loud").is_err());
        assert!(parse_stream_ref("main@101").is_err());
        assert!(parse_stream_ref("@50").is_err());
    }
}
