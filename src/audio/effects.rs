use std::fmt;
use std::str::FromStr;

/// Filtros de audio disponibles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFilter {
    /// Faster and higher pitched.
    Nightcore,
    /// Heavy distortion.
    Earrape,
    /// Pans the audio around the listener.
    Audio8D,
    Chorus,
    Chorus2d,
    Chorus3d,
}

impl AudioFilter {
    pub const ALL: [AudioFilter; 6] = [
        AudioFilter::Nightcore,
        AudioFilter::Earrape,
        AudioFilter::Audio8D,
        AudioFilter::Chorus,
        AudioFilter::Chorus2d,
        AudioFilter::Chorus3d,
    ];

    /// Expresión de ffmpeg para `-af`
    pub fn expression(self) -> &'static str {
        match self {
            AudioFilter::Nightcore => "atempo=1.06,asetrate=48000*1.25",
            AudioFilter::Earrape => "channelsplit,sidechaingate=level_in=64",
            AudioFilter::Audio8D => "apulsator=hz=0.09",
            AudioFilter::Chorus => "chorus=0.7:0.9:55:0.4:0.25:2",
            AudioFilter::Chorus2d => "chorus=0.6:0.9:50|60:0.4|0.32:0.25|0.4:2|1.3",
            AudioFilter::Chorus3d => {
                "chorus=0.5:0.9:50|60|40:0.4|0.32|0.3:0.25|0.4|0.3:2|2.3|1.3"
            }
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            AudioFilter::Nightcore => "nightcore",
            AudioFilter::Earrape => "earrape",
            AudioFilter::Audio8D => "8d",
            AudioFilter::Chorus => "chorus",
            AudioFilter::Chorus2d => "chorus2d",
            AudioFilter::Chorus3d => "chorus3d",
        }
    }
}

impl fmt::Display for AudioFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioFilter::Nightcore => "Nightcore",
            AudioFilter::Earrape => "Earrape",
            AudioFilter::Audio8D => "8D audio",
            AudioFilter::Chorus => "Chorus",
            AudioFilter::Chorus2d => "Chorus 2D",
            AudioFilter::Chorus3d => "Chorus 3D",
        };
        f.write_str(name)
    }
}

impl FromStr for AudioFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        AudioFilter::ALL
            .into_iter()
            .find(|filter| filter.key() == wanted)
            .ok_or_else(|| anyhow::anyhow!("unknown audio filter: {}", s))
    }
}

/// Construye la expresión combinada: filters in list order, then the volume
/// multiplier when it is not unity. `None` when there is nothing to apply.
pub fn filter_graph(filters: &[AudioFilter], volume_percent: Option<u16>) -> Option<String> {
    let mut parts: Vec<String> = filters.iter().map(|f| f.expression().to_string()).collect();

    if let Some(volume) = volume_percent.filter(|v| *v != 100) {
        parts.push(format!("volume={:.2}", f64::from(volume) / 100.0));
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn filters_are_joined_in_list_order() {
        let graph = filter_graph(&[AudioFilter::Audio8D, AudioFilter::Nightcore], None);
        assert_eq!(
            graph.as_deref(),
            Some("apulsator=hz=0.09,atempo=1.06,asetrate=48000*1.25")
        );
    }

    #[test]
    fn unity_volume_adds_nothing() {
        assert_eq!(filter_graph(&[], Some(100)), None);
        assert_eq!(filter_graph(&[], None), None);
    }

    #[test]
    fn volume_is_a_linear_multiplier() {
        assert_eq!(filter_graph(&[], Some(50)).as_deref(), Some("volume=0.50"));
        assert_eq!(
            filter_graph(&[AudioFilter::Chorus], Some(175)).as_deref(),
            Some("chorus=0.7:0.9:55:0.4:0.25:2,volume=1.75")
        );
    }

    #[test]
    fn filter_keys_parse_back() {
        for filter in AudioFilter::ALL {
            assert_eq!(filter.key().parse::<AudioFilter>().ok(), Some(filter));
        }
        assert!("reverb".parse::<AudioFilter>().is_err());
    }
}
