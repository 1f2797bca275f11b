use std::fmt;
use std::str::FromStr;

use crate::audio::item::{CustomAudio, PlayableItem, TrackDuration, TranscodeOptions};

/// Estaciones de radio predefinidas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RadioStation {
    PowerHitRadio,
    M1,
}

impl RadioStation {
    pub const ALL: [RadioStation; 2] = [RadioStation::PowerHitRadio, RadioStation::M1];

    pub fn url(self) -> &'static str {
        match self {
            RadioStation::PowerHitRadio => "https://powerhit.ls.lv/PHR_AAC",
            RadioStation::M1 => "https://stream.m-1.fm/m1/aacp64",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RadioStation::PowerHitRadio => "Power Hit Radio",
            RadioStation::M1 => "M-1",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            RadioStation::PowerHitRadio => "powerhitradio",
            RadioStation::M1 => "m1",
        }
    }

    /// Item en vivo para la cola
    pub fn to_item(self) -> PlayableItem {
        PlayableItem::CustomAudio(CustomAudio {
            locator: self.url().to_string(),
            title: self.name().to_string(),
            duration: TrackDuration::Unbounded,
            options: TranscodeOptions::default(),
        })
    }
}

impl fmt::Display for RadioStation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RadioStation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RadioStation::ALL
            .into_iter()
            .find(|station| station.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("Estación desconocida: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stations_are_live_items() {
        for station in RadioStation::ALL {
            let item = station.to_item();
            assert!(item.is_live());
            assert_eq!(item.title(), station.name());
        }
    }

    #[test]
    fn parses_keys() {
        assert_eq!("M1".parse::<RadioStation>().unwrap(), RadioStation::M1);
        assert_eq!("powerhitradio".parse::<RadioStation>().unwrap(), RadioStation::PowerHitRadio);
        assert!("kiss".parse::<RadioStation>().is_err());
    }
}
