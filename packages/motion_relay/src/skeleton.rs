//! Fixed key vocabularies for bones and facial blend shapes.
//!
//! Names are the normalized (snake_case) spelling of the keys capture
//! software sends, e.g. `LeftUpperArm` -> `left_upper_arm`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::DecodeError;

macro_rules! vocabulary {
    (
        $(#[$meta:meta])*
        $name:ident, $unknown:ident {
            $($variant:ident => $key:literal,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant,)*
        }

        impl $name {
            /// Every name in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $key,)*
                }
            }
        }

        impl FromStr for $name {
            type Err = DecodeError;

            /// Parse an already-normalized key
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($key => Ok($name::$variant),)*
                    other => Err(DecodeError::$unknown(other.to_string())),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

vocabulary! {
    /// Humanoid skeletal joints
    BoneName, UnknownBone {
        Hips => "hips",
        Spine => "spine",
        Chest => "chest",
        UpperChest => "upper_chest",
        Neck => "neck",
        Head => "head",
        LeftEye => "left_eye",
        RightEye => "right_eye",
        Jaw => "jaw",

        LeftShoulder => "left_shoulder",
        LeftUpperArm => "left_upper_arm",
        LeftLowerArm => "left_lower_arm",
        LeftHand => "left_hand",
        RightShoulder => "right_shoulder",
        RightUpperArm => "right_upper_arm",
        RightLowerArm => "right_lower_arm",
        RightHand => "right_hand",

        LeftUpperLeg => "left_upper_leg",
        LeftLowerLeg => "left_lower_leg",
        LeftFoot => "left_foot",
        LeftToes => "left_toes",
        RightUpperLeg => "right_upper_leg",
        RightLowerLeg => "right_lower_leg",
        RightFoot => "right_foot",
        RightToes => "right_toes",

        LeftThumbProximal => "left_thumb_proximal",
        LeftThumbIntermediate => "left_thumb_intermediate",
        LeftThumbDistal => "left_thumb_distal",
        LeftIndexProximal => "left_index_proximal",
        LeftIndexIntermediate => "left_index_intermediate",
        LeftIndexDistal => "left_index_distal",
        LeftMiddleProximal => "left_middle_proximal",
        LeftMiddleIntermediate => "left_middle_intermediate",
        LeftMiddleDistal => "left_middle_distal",
        LeftRingProximal => "left_ring_proximal",
        LeftRingIntermediate => "left_ring_intermediate",
        LeftRingDistal => "left_ring_distal",
        LeftLittleProximal => "left_little_proximal",
        LeftLittleIntermediate => "left_little_intermediate",
        LeftLittleDistal => "left_little_distal",

        RightThumbProximal => "right_thumb_proximal",
        RightThumbIntermediate => "right_thumb_intermediate",
        RightThumbDistal => "right_thumb_distal",
        RightIndexProximal => "right_index_proximal",
        RightIndexIntermediate => "right_index_intermediate",
        RightIndexDistal => "right_index_distal",
        RightMiddleProximal => "right_middle_proximal",
        RightMiddleIntermediate => "right_middle_intermediate",
        RightMiddleDistal => "right_middle_distal",
        RightRingProximal => "right_ring_proximal",
        RightRingIntermediate => "right_ring_intermediate",
        RightRingDistal => "right_ring_distal",
        RightLittleProximal => "right_little_proximal",
        RightLittleIntermediate => "right_little_intermediate",
        RightLittleDistal => "right_little_distal",
    }
}

vocabulary! {
    /// Facial expression weights (ARKit naming)
    ShapeName, UnknownShape {
        EyeBlinkLeft => "eye_blink_left",
        EyeLookDownLeft => "eye_look_down_left",
        EyeLookInLeft => "eye_look_in_left",
        EyeLookOutLeft => "eye_look_out_left",
        EyeLookUpLeft => "eye_look_up_left",
        EyeSquintLeft => "eye_squint_left",
        EyeWideLeft => "eye_wide_left",
        EyeBlinkRight => "eye_blink_right",
        EyeLookDownRight => "eye_look_down_right",
        EyeLookInRight => "eye_look_in_right",
        EyeLookOutRight => "eye_look_out_right",
        EyeLookUpRight => "eye_look_up_right",
        EyeSquintRight => "eye_squint_right",
        EyeWideRight => "eye_wide_right",

        JawForward => "jaw_forward",
        JawLeft => "jaw_left",
        JawRight => "jaw_right",
        JawOpen => "jaw_open",

        MouthClose => "mouth_close",
        MouthFunnel => "mouth_funnel",
        MouthPucker => "mouth_pucker",
        MouthLeft => "mouth_left",
        MouthRight => "mouth_right",
        MouthSmileLeft => "mouth_smile_left",
        MouthSmileRight => "mouth_smile_right",
        MouthFrownLeft => "mouth_frown_left",
        MouthFrownRight => "mouth_frown_right",
        MouthDimpleLeft => "mouth_dimple_left",
        MouthDimpleRight => "mouth_dimple_right",
        MouthStretchLeft => "mouth_stretch_left",
        MouthStretchRight => "mouth_stretch_right",
        MouthRollLower => "mouth_roll_lower",
        MouthRollUpper => "mouth_roll_upper",
        MouthShrugLower => "mouth_shrug_lower",
        MouthShrugUpper => "mouth_shrug_upper",
        MouthPressLeft => "mouth_press_left",
        MouthPressRight => "mouth_press_right",
        MouthLowerDownLeft => "mouth_lower_down_left",
        MouthLowerDownRight => "mouth_lower_down_right",
        MouthUpperUpLeft => "mouth_upper_up_left",
        MouthUpperUpRight => "mouth_upper_up_right",

        BrowDownLeft => "brow_down_left",
        BrowDownRight => "brow_down_right",
        BrowInnerUp => "brow_inner_up",
        BrowOuterUpLeft => "brow_outer_up_left",
        BrowOuterUpRight => "brow_outer_up_right",

        CheekPuff => "cheek_puff",
        CheekSquintLeft => "cheek_squint_left",
        CheekSquintRight => "cheek_squint_right",

        NoseSneerLeft => "nose_sneer_left",
        NoseSneerRight => "nose_sneer_right",

        TongueOut => "tongue_out",
    }
}
