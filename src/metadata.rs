//! Per-frame dynamic wallpaper metadata.
//!
//! A [`MetaData`] record places one frame of a dynamic wallpaper on the day (`Time`) or on the
//! sun's path (`SolarAzimuth` / `SolarElevation`), and says whether the viewer cross-fades into
//! it. Every field is optional; [`MetaData::fields`] reports which ones were set.

use std::ops::{BitOr, BitOrAssign};

use serde_json::{Map, Value};

const CROSS_FADE_KEY: &str = "CrossFade";
const TIME_KEY: &str = "Time";
const SOLAR_AZIMUTH_KEY: &str = "SolarAzimuth";
const SOLAR_ELEVATION_KEY: &str = "SolarElevation";
const INDEX_KEY: &str = "Index";

/// Whether the viewer blends into a frame or hard-cuts to it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CrossFadeMode {
    /// Hard cut.
    #[default]
    NoCrossFade,
    /// Blend with the neighbouring frame.
    CrossFade,
}

/// One optional metadata field. Discriminants are the presence bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MetaDataField {
    /// [`MetaData::cross_fade_mode`].
    CrossFade = 1 << 0,
    /// [`MetaData::time`].
    Time = 1 << 1,
    /// [`MetaData::solar_azimuth`].
    SolarAzimuth = 1 << 2,
    /// [`MetaData::solar_elevation`].
    SolarElevation = 1 << 3,
    /// [`MetaData::index`].
    Index = 1 << 4,
}

impl MetaDataField {
    /// All fields in bit order.
    pub const ALL: [MetaDataField; 5] = [
        MetaDataField::CrossFade,
        MetaDataField::Time,
        MetaDataField::SolarAzimuth,
        MetaDataField::SolarElevation,
        MetaDataField::Index,
    ];

    /// The presence bit of this field.
    pub const fn bit(self) -> u8 {
        self as u8
    }
}

/// Presence bitmask: the union of [`MetaDataField`] bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MetaDataFields(u8);

impl MetaDataFields {
    /// The empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bit representation.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Return `true` when no field is present.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Return `true` when `field` is present.
    pub const fn contains(self, field: MetaDataField) -> bool {
        self.0 & field.bit() != 0
    }

    /// Add `field` to the set.
    pub fn insert(&mut self, field: MetaDataField) {
        self.0 |= field.bit();
    }

    /// Iterate the present fields in bit order.
    pub fn iter(self) -> impl Iterator<Item = MetaDataField> {
        MetaDataField::ALL
            .into_iter()
            .filter(move |f| self.contains(*f))
    }
}

impl From<MetaDataField> for MetaDataFields {
    fn from(field: MetaDataField) -> Self {
        Self(field.bit())
    }
}

impl BitOr for MetaDataFields {
    type Output = MetaDataFields;

    fn bitor(self, rhs: MetaDataFields) -> MetaDataFields {
        MetaDataFields(self.0 | rhs.0)
    }
}

impl BitOr<MetaDataField> for MetaDataFields {
    type Output = MetaDataFields;

    fn bitor(self, rhs: MetaDataField) -> MetaDataFields {
        MetaDataFields(self.0 | rhs.bit())
    }
}

impl BitOr for MetaDataField {
    type Output = MetaDataFields;

    fn bitor(self, rhs: MetaDataField) -> MetaDataFields {
        MetaDataFields(self.bit() | rhs.bit())
    }
}

impl BitOrAssign<MetaDataField> for MetaDataFields {
    fn bitor_assign(&mut self, rhs: MetaDataField) {
        self.insert(rhs);
    }
}

/// Metadata describing where one frame sits in time and on the sun's path.
///
/// Plain value type: copies never observe each other's mutations. Each field is stored as an
/// `Option`, so "present but zero" and "absent" stay distinct.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MetaData {
    cross_fade_mode: Option<CrossFadeMode>,
    time: Option<f64>,
    solar_azimuth: Option<f64>,
    solar_elevation: Option<f64>,
    index: Option<i32>,
}

impl MetaData {
    /// Create an empty (invalid) record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Presence bitmask of the fields that have been set.
    pub fn fields(&self) -> MetaDataFields {
        let mut fields = MetaDataFields::empty();
        if self.cross_fade_mode.is_some() {
            fields |= MetaDataField::CrossFade;
        }
        if self.time.is_some() {
            fields |= MetaDataField::Time;
        }
        if self.solar_azimuth.is_some() {
            fields |= MetaDataField::SolarAzimuth;
        }
        if self.solar_elevation.is_some() {
            fields |= MetaDataField::SolarElevation;
        }
        if self.index.is_some() {
            fields |= MetaDataField::Index;
        }
        fields
    }

    /// A record is valid when at least one field is present.
    pub fn is_valid(&self) -> bool {
        !self.fields().is_empty()
    }

    /// Set the cross-fade mode.
    pub fn set_cross_fade_mode(&mut self, mode: CrossFadeMode) {
        self.cross_fade_mode = Some(mode);
    }

    /// Stored cross-fade mode, [`CrossFadeMode::NoCrossFade`] when absent.
    pub fn cross_fade_mode(&self) -> CrossFadeMode {
        self.cross_fade_mode.unwrap_or_default()
    }

    /// Set the time of day as a fraction of a day. Not range-checked.
    pub fn set_time(&mut self, time: f64) {
        self.time = Some(time);
    }

    /// Stored time of day, `0.0` when absent.
    pub fn time(&self) -> f64 {
        self.time.unwrap_or_default()
    }

    /// Set the solar elevation in degrees. Not range-checked.
    pub fn set_solar_elevation(&mut self, elevation: f64) {
        self.solar_elevation = Some(elevation);
    }

    /// Stored solar elevation, `0.0` when absent.
    pub fn solar_elevation(&self) -> f64 {
        self.solar_elevation.unwrap_or_default()
    }

    /// Set the solar azimuth in degrees. Not range-checked.
    pub fn set_solar_azimuth(&mut self, azimuth: f64) {
        self.solar_azimuth = Some(azimuth);
    }

    /// Stored solar azimuth, `0.0` when absent.
    pub fn solar_azimuth(&self) -> f64 {
        self.solar_azimuth.unwrap_or_default()
    }

    /// Set the ordinal among frames that share identical time metadata.
    pub fn set_index(&mut self, index: i32) {
        self.index = Some(index);
    }

    /// Stored index, `0` when absent.
    pub fn index(&self) -> i32 {
        self.index.unwrap_or_default()
    }

    /// Encode the present fields as a JSON object. Absent fields are omitted.
    ///
    /// Non-finite numbers become `null` (JSON has no representation for them) and therefore
    /// read back as absent.
    pub fn to_json(&self) -> Map<String, Value> {
        let mut object = Map::new();
        if let Some(mode) = self.cross_fade_mode {
            object.insert(
                CROSS_FADE_KEY.to_owned(),
                Value::Bool(mode == CrossFadeMode::CrossFade),
            );
        }
        if let Some(time) = self.time {
            object.insert(TIME_KEY.to_owned(), Value::from(time));
        }
        if let Some(azimuth) = self.solar_azimuth {
            object.insert(SOLAR_AZIMUTH_KEY.to_owned(), Value::from(azimuth));
        }
        if let Some(elevation) = self.solar_elevation {
            object.insert(SOLAR_ELEVATION_KEY.to_owned(), Value::from(elevation));
        }
        if let Some(index) = self.index {
            object.insert(INDEX_KEY.to_owned(), Value::from(index));
        }
        object
    }

    /// Best-effort decode of a JSON object.
    ///
    /// Unknown keys are ignored. A recognized key whose value has the wrong type leaves that
    /// field absent; this never fails.
    pub fn from_json(object: &Map<String, Value>) -> Self {
        let mut md = MetaData::new();
        if let Some(crossfade) = object.get(CROSS_FADE_KEY).and_then(Value::as_bool) {
            md.set_cross_fade_mode(if crossfade {
                CrossFadeMode::CrossFade
            } else {
                CrossFadeMode::NoCrossFade
            });
        }
        if let Some(time) = object.get(TIME_KEY).and_then(Value::as_f64) {
            md.set_time(time);
        }
        if let Some(azimuth) = object.get(SOLAR_AZIMUTH_KEY).and_then(Value::as_f64) {
            md.set_solar_azimuth(azimuth);
        }
        if let Some(elevation) = object.get(SOLAR_ELEVATION_KEY).and_then(Value::as_f64) {
            md.set_solar_elevation(elevation);
        }
        if let Some(index) = object.get(INDEX_KEY).and_then(json_to_i32) {
            md.set_index(index);
        }
        md
    }
}

fn json_to_i32(value: &Value) -> Option<i32> {
    if let Some(v) = value.as_i64() {
        return i32::try_from(v).ok();
    }
    let v = value.as_f64()?;
    if v.fract() == 0.0 && v >= f64::from(i32::MIN) && v <= f64::from(i32::MAX) {
        Some(v as i32)
    } else {
        None
    }
}

impl serde::Serialize for MetaData {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&self.to_json(), serializer)
    }
}

impl<'de> serde::Deserialize<'de> for MetaData {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let object = <Map<String, Value> as serde::Deserialize>::deserialize(deserializer)?;
        Ok(MetaData::from_json(&object))
    }
}

#[cfg(test)]
#[path = "../tests/unit/metadata.rs"]
mod tests;
