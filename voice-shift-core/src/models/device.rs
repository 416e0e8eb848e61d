use serde::{Deserialize, Serialize};

/// Numeric endpoint identifier assigned by the platform.
pub type DeviceId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceDirection {
    Input,
    Output,
}

/// Physical/logical class of an audio endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    BuiltinMic,
    BuiltinSpeaker,
    Telephony,
    WiredHeadset,
    WiredHeadphones,
    /// High-fidelity, playback-oriented Bluetooth profile.
    BluetoothA2dp,
    /// Voice-call-grade, low-latency Bluetooth link.
    BluetoothSco,
    Usb,
    Other,
}

impl DeviceClass {
    pub fn is_bluetooth(&self) -> bool {
        matches!(self, Self::BluetoothA2dp | Self::BluetoothSco)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::BuiltinMic => "Built-in microphone",
            Self::BuiltinSpeaker => "Built-in speaker",
            Self::Telephony => "Telephony",
            Self::WiredHeadset => "Wired headset",
            Self::WiredHeadphones => "Wired headphones",
            Self::BluetoothA2dp => "Bluetooth (high quality)",
            Self::BluetoothSco => "Bluetooth (low latency)",
            Self::Usb => "USB audio",
            Self::Other => "Audio device",
        }
    }
}

/// An audio endpoint available for capture or playback.
///
/// Created from platform topology; the engine only ever reads these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: DeviceId,
    pub direction: DeviceDirection,
    pub class: DeviceClass,
    pub label: String,
    pub is_default: bool,
}

impl DeviceDescriptor {
    pub fn new(id: DeviceId, direction: DeviceDirection, class: DeviceClass, label: impl Into<String>) -> Self {
        Self {
            id,
            direction,
            class,
            label: label.into(),
            is_default: false,
        }
    }

    /// "<id>: <class label> (<name>)", the way device pickers show it.
    pub fn display_name(&self) -> String {
        if self.label.is_empty() {
            format!("{}: {}", self.id, self.class.label())
        } else {
            format!("{}: {} ({})", self.id, self.class.label(), self.label)
        }
    }
}

/// Which device classes are surfaced to callers, per direction.
///
/// The default is the voice policy: capture from microphones and headsets,
/// play back only to private listening devices. The built-in speaker is hidden
/// because routing a live microphone to it feeds back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFilter {
    pub input_classes: Vec<DeviceClass>,
    pub output_classes: Vec<DeviceClass>,
}

impl DeviceFilter {
    /// Voice policy plus built-in speaker and unclassified endpoints.
    pub fn permissive() -> Self {
        let mut filter = Self::default();
        filter.input_classes.push(DeviceClass::Other);
        filter.output_classes.push(DeviceClass::BuiltinSpeaker);
        filter.output_classes.push(DeviceClass::Other);
        filter
    }

    pub fn allows(&self, direction: DeviceDirection, class: DeviceClass) -> bool {
        match direction {
            DeviceDirection::Input => self.input_classes.contains(&class),
            DeviceDirection::Output => self.output_classes.contains(&class),
        }
    }

    /// Keep only the descriptors this policy surfaces.
    pub fn apply(&self, devices: Vec<DeviceDescriptor>) -> Vec<DeviceDescriptor> {
        devices
            .into_iter()
            .filter(|d| self.allows(d.direction, d.class))
            .collect()
    }
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self {
            input_classes: vec![
                DeviceClass::BuiltinMic,
                DeviceClass::Telephony,
                DeviceClass::WiredHeadset,
                DeviceClass::BluetoothA2dp,
                DeviceClass::BluetoothSco,
                DeviceClass::Usb,
            ],
            output_classes: vec![
                DeviceClass::WiredHeadset,
                DeviceClass::WiredHeadphones,
                DeviceClass::BluetoothA2dp,
                DeviceClass::BluetoothSco,
                DeviceClass::Usb,
            ],
        }
    }
}

/// Preferred classes when no explicit (or no present) device is configured.
pub const INPUT_PREFERENCE: [DeviceClass; 2] = [DeviceClass::BuiltinMic, DeviceClass::Telephony];
pub const OUTPUT_PREFERENCE: [DeviceClass; 2] = [DeviceClass::WiredHeadphones, DeviceClass::BluetoothSco];

/// Pick the endpoint to open for one direction.
///
/// A configured id wins if that device is currently present. Otherwise the
/// first present device matching `preference` (in order) is used. `None`
/// means "no preference", leaving routing to the platform default.
pub fn resolve_device(
    configured: Option<DeviceId>,
    present: &[DeviceDescriptor],
    preference: &[DeviceClass],
) -> Option<DeviceDescriptor> {
    if let Some(id) = configured {
        if let Some(device) = present.iter().find(|d| d.id == id) {
            return Some(device.clone());
        }
        log::warn!("Configured device {} is not present, falling back to auto selection", id);
    }

    preference
        .iter()
        .find_map(|class| present.iter().find(|d| d.class == *class))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(id: DeviceId, class: DeviceClass) -> DeviceDescriptor {
        DeviceDescriptor::new(id, DeviceDirection::Input, class, "")
    }

    fn output(id: DeviceId, class: DeviceClass) -> DeviceDescriptor {
        DeviceDescriptor::new(id, DeviceDirection::Output, class, "")
    }

    #[test]
    fn configured_present_device_wins() {
        let present = vec![output(1, DeviceClass::WiredHeadphones), output(2, DeviceClass::BluetoothA2dp)];
        let chosen = resolve_device(Some(2), &present, &OUTPUT_PREFERENCE).unwrap();
        assert_eq!(chosen.id, 2);
    }

    #[test]
    fn missing_configured_device_falls_back_to_preference() {
        let present = vec![output(7, DeviceClass::BluetoothSco), output(3, DeviceClass::WiredHeadphones)];
        let chosen = resolve_device(Some(99), &present, &OUTPUT_PREFERENCE).unwrap();
        assert_eq!(chosen.id, 3);
    }

    #[test]
    fn preference_order_is_respected() {
        let present = vec![input(5, DeviceClass::Telephony), input(4, DeviceClass::BuiltinMic)];
        let chosen = resolve_device(None, &present, &INPUT_PREFERENCE).unwrap();
        assert_eq!(chosen.class, DeviceClass::BuiltinMic);
    }

    #[test]
    fn no_match_means_platform_default() {
        let present = vec![output(1, DeviceClass::BluetoothA2dp)];
        assert!(resolve_device(None, &present, &OUTPUT_PREFERENCE).is_none());
    }

    #[test]
    fn default_filter_hides_speaker_output() {
        let filter = DeviceFilter::default();
        assert!(!filter.allows(DeviceDirection::Output, DeviceClass::BuiltinSpeaker));
        assert!(filter.allows(DeviceDirection::Output, DeviceClass::WiredHeadphones));
        assert!(filter.allows(DeviceDirection::Input, DeviceClass::BuiltinMic));

        let kept = filter.apply(vec![
            output(1, DeviceClass::BuiltinSpeaker),
            output(2, DeviceClass::BluetoothSco),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 2);
    }

    #[test]
    fn permissive_filter_exposes_speaker() {
        assert!(DeviceFilter::permissive().allows(DeviceDirection::Output, DeviceClass::BuiltinSpeaker));
    }

    #[test]
    fn display_name_includes_class_and_label() {
        let mut device = output(12, DeviceClass::BluetoothSco);
        device.label = "Buds".into();
        assert_eq!(device.display_name(), "12: Bluetooth (low latency) (Buds)");
    }
}
