use serde::{Deserialize, Serialize};

/// 8-bit RGB value for one addressable zone of a suit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PartColor {
    #[serde(default)]
    pub r: u8,
    #[serde(default)]
    pub g: u8,
    #[serde(default)]
    pub b: u8,
}

impl PartColor {
    pub const OFF: Self = Self::rgb(0, 0, 0);
    pub const RED: Self = Self::rgb(255, 0, 0);
    pub const GREEN: Self = Self::rgb(0, 128, 0);
    pub const BLUE: Self = Self::rgb(0, 0, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// A part is lit as soon as any channel is nonzero.
    pub fn is_lit(&self) -> bool {
        self.r != 0 || self.g != 0 || self.b != 0
    }
}

/// The six zones of a suit, in wire order (most significant bit first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuitPart {
    Head,
    BodyPrimary,
    BodySecondary,
    LegPrimary,
    LegSecondary,
    Reserve,
}

impl SuitPart {
    pub const ALL: [SuitPart; 6] = [
        SuitPart::Head,
        SuitPart::BodyPrimary,
        SuitPart::BodySecondary,
        SuitPart::LegPrimary,
        SuitPart::LegSecondary,
        SuitPart::Reserve,
    ];

    /// Bit assigned to the part in the status byte of a wire record.
    pub fn bit(self) -> u8 {
        match self {
            SuitPart::Head => 1 << 5,
            SuitPart::BodyPrimary => 1 << 4,
            SuitPart::BodySecondary => 1 << 3,
            SuitPart::LegPrimary => 1 << 2,
            SuitPart::LegSecondary => 1 << 1,
            SuitPart::Reserve => 1,
        }
    }

    /// Field name used by the JSON formats.
    pub fn key(self) -> &'static str {
        match self {
            SuitPart::Head => "head",
            SuitPart::BodyPrimary => "bodyPrimary",
            SuitPart::BodySecondary => "bodySecondary",
            SuitPart::LegPrimary => "legPrimary",
            SuitPart::LegSecondary => "legSecondary",
            SuitPart::Reserve => "reserve",
        }
    }
}

/// Secondary color a suit is wired with; the pictogram toggles it on the
/// secondary zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SecondaryColor {
    #[default]
    Red,
    Green,
}

impl SecondaryColor {
    pub fn color(self) -> PartColor {
        match self {
            SecondaryColor::Red => PartColor::RED,
            SecondaryColor::Green => PartColor::GREEN,
        }
    }
}

/// Color of every zone of one suit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuitState {
    #[serde(default)]
    pub head: PartColor,
    #[serde(default)]
    pub body_primary: PartColor,
    #[serde(default)]
    pub body_secondary: PartColor,
    #[serde(default)]
    pub leg_primary: PartColor,
    #[serde(default)]
    pub leg_secondary: PartColor,
    #[serde(default)]
    pub reserve: PartColor,
}

impl SuitState {
    pub fn part(&self, part: SuitPart) -> PartColor {
        match part {
            SuitPart::Head => self.head,
            SuitPart::BodyPrimary => self.body_primary,
            SuitPart::BodySecondary => self.body_secondary,
            SuitPart::LegPrimary => self.leg_primary,
            SuitPart::LegSecondary => self.leg_secondary,
            SuitPart::Reserve => self.reserve,
        }
    }

    pub fn set_part(&mut self, part: SuitPart, color: PartColor) {
        let slot = match part {
            SuitPart::Head => &mut self.head,
            SuitPart::BodyPrimary => &mut self.body_primary,
            SuitPart::BodySecondary => &mut self.body_secondary,
            SuitPart::LegPrimary => &mut self.leg_primary,
            SuitPart::LegSecondary => &mut self.leg_secondary,
            SuitPart::Reserve => &mut self.reserve,
        };
        *slot = color;
    }

    /// Click behaviour of the suit pictogram: a dark zone lights up in its
    /// zone color, a lit zone goes dark. The reserve zone is not clickable.
    pub fn toggle_part(&mut self, part: SuitPart, secondary: SecondaryColor) {
        let lit = match part {
            SuitPart::Head => PartColor::RED,
            SuitPart::BodyPrimary | SuitPart::LegPrimary => PartColor::BLUE,
            SuitPart::BodySecondary | SuitPart::LegSecondary => secondary.color(),
            SuitPart::Reserve => return,
        };

        let next = if self.part(part).is_lit() {
            PartColor::OFF
        } else {
            lit
        };
        self.set_part(part, next);
    }

    pub fn is_dark(&self) -> bool {
        SuitPart::ALL.iter().all(|part| !self.part(*part).is_lit())
    }
}

/// Snapshot of every suit at one point on the timeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Waypoint {
    #[serde(rename = "timeInSeconds", default)]
    pub time_seconds: f64,
    #[serde(rename = "suitStates", default)]
    pub suit_states: Vec<SuitState>,
}

impl Waypoint {
    pub fn new(time_seconds: f64, suit_states: Vec<SuitState>) -> Self {
        Self {
            time_seconds: sanitize_time(time_seconds),
            suit_states,
        }
    }

    pub fn suit_count(&self) -> usize {
        self.suit_states.len()
    }
}

pub(crate) fn sanitize_time(time_seconds: f64) -> f64 {
    if time_seconds.is_finite() {
        time_seconds.max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_accessors_follow_wire_order() {
        let mut state = SuitState::default();
        for (i, part) in SuitPart::ALL.iter().enumerate() {
            state.set_part(*part, PartColor::rgb(i as u8 + 1, 0, 0));
        }

        assert_eq!(state.head.r, 1);
        assert_eq!(state.reserve.r, 6);
        assert_eq!(state.part(SuitPart::LegPrimary), PartColor::rgb(4, 0, 0));
        let bits: Vec<u8> = SuitPart::ALL.iter().map(|p| p.bit()).collect();
        assert_eq!(bits, vec![0x20, 0x10, 0x08, 0x04, 0x02, 0x01]);
    }

    #[test]
    fn toggling_uses_zone_colors() {
        let mut state = SuitState::default();
        state.toggle_part(SuitPart::Head, SecondaryColor::Green);
        state.toggle_part(SuitPart::BodyPrimary, SecondaryColor::Green);
        state.toggle_part(SuitPart::LegSecondary, SecondaryColor::Green);
        state.toggle_part(SuitPart::Reserve, SecondaryColor::Green);

        assert_eq!(state.head, PartColor::RED);
        assert_eq!(state.body_primary, PartColor::BLUE);
        assert_eq!(state.leg_secondary, PartColor::GREEN);
        assert_eq!(state.reserve, PartColor::OFF);

        state.toggle_part(SuitPart::Head, SecondaryColor::Green);
        assert_eq!(state.head, PartColor::OFF);
    }

    #[test]
    fn negative_waypoint_times_clamp_to_zero() {
        let waypoint = Waypoint::new(-2.5, vec![SuitState::default()]);
        assert_eq!(waypoint.time_seconds, 0.0);
        assert_eq!(Waypoint::new(f64::NAN, Vec::new()).time_seconds, 0.0);
    }

    #[test]
    fn json_uses_camel_case_part_names() {
        let waypoint = Waypoint::new(1.5, vec![SuitState::default()]);
        let json = serde_json::to_value(&waypoint).unwrap();

        assert_eq!(json["timeInSeconds"], 1.5);
        assert!(json["suitStates"][0]["bodyPrimary"].is_object());
        assert_eq!(json["suitStates"][0]["legSecondary"]["g"], 0);
    }
}
