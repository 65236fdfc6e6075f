use serde::{Deserialize, Serialize};

/// Where the value of a parameter is sent before each acquisition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterTarget {
    /// A setter of the instrument itself, addressed by group and key
    Native { group: String, key: String },
    /// Applied by the user callback
    User,
    /// A variable of the pulse-program definition file
    Definition,
}

/// Parameters with a native setter on the spectrometer, as `(name, group, key)`
const NATIVE: &[(&str, &str, &str)] = &[
    // Receiver unit
    ("VideoGain", "AcqHidden", "ftBridge.VideoGain"),
    ("Attenuation", "AcqHidden", "ftBridge.Attenuation"),
    ("SignalPhase", "AcqHidden", "cwBridge.SignalPhase"),
    ("TMLevel", "AcqHidden", "ftBridge.TMLevel"),
    // MPFU channels
    ("BrXPhase", "AcqHidden", "ftBridge.BrXPhase"),
    ("BrXAmp", "AcqHidden", "ftBridge.BrXAmp"),
    ("BrYPhase", "AcqHidden", "ftBridge.BrYPhase"),
    ("BrYAmp", "AcqHidden", "ftBridge.BrYAmp"),
    ("BrMinXPhase", "AcqHidden", "ftBridge.BrMinXPhase"),
    ("BrMinXAmp", "AcqHidden", "ftBridge.BrMinXAmp"),
    ("BrMinYPhase", "AcqHidden", "ftBridge.BrMinYPhase"),
    ("BrMinYAmp", "AcqHidden", "ftBridge.BrMinYAmp"),
    // Field
    ("CenterField", "Experiment", "fieldCtrl.CenterField"),
];

impl ParameterTarget {
    /// Route a parameter by its name
    ///
    /// - names containing `&` are user parameters
    /// - names with a native setter go to the instrument
    /// - everything else is a definition-file variable
    pub fn classify(name: &str) -> Self {
        if name.contains('&') {
            return ParameterTarget::User;
        }
        match NATIVE.iter().find(|(native, _, _)| *native == name) {
            Some((_, group, key)) => ParameterTarget::Native {
                group: group.to_string(),
                key: key.to_string(),
            },
            None => ParameterTarget::Definition,
        }
    }

    /// The names with a known native setter
    pub fn native_names() -> impl Iterator<Item = &'static str> {
        NATIVE.iter().map(|(name, _, _)| *name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(ParameterTarget::classify("&shape_a"), ParameterTarget::User);
        assert_eq!(ParameterTarget::classify("d1&"), ParameterTarget::User);
        assert_eq!(
            ParameterTarget::classify("SignalPhase"),
            ParameterTarget::Native {
                group: "AcqHidden".into(),
                key: "cwBridge.SignalPhase".into()
            }
        );
        assert_eq!(ParameterTarget::classify("p1"), ParameterTarget::Definition);
        // matching is case sensitive
        assert_eq!(
            ParameterTarget::classify("videogain"),
            ParameterTarget::Definition
        );
        assert_eq!(ParameterTarget::native_names().count(), 13);
    }
}
