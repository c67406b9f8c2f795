//! VMC protocol decoding.
//!
//! Turns OSC messages into typed [`PoseDelta`]s. Pure functions: nothing in
//! here touches shared state, merging is the [`crate::PoseStore`]'s job.

use crate::error::DecodeError;
use crate::osc::{self, OscArg, OscMessage};
use crate::pose::{BoneTransform, PoseDelta, Rotation, Vec3, clamp_weight};
use crate::skeleton::{BoneName, ShapeName};

/// `[key, px, py, pz, qx, qy, qz, qw]`
pub const BONE_POS: &str = "/VMC/Ext/Bone/Pos";

/// `[key, value]`
pub const BLEND_VAL: &str = "/VMC/Ext/Blend/Val";

/// Prefix shared by every VMC address
const VMC_PREFIX: &str = "/VMC/";

const BONE_ARGS: usize = 8;
const BLEND_ARGS: usize = 2;

/// Normalize a capture key to the snake_case vocabulary spelling.
///
/// A `_` goes in front of every uppercase letter that follows a lowercase
/// one, the result is lowercased, and a trailing `_l` / `_r` is spelled out
/// as `_left` / `_right`. Normalizing twice gives the same result as once.
pub fn normalize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 8);
    let mut prev_lower = false;
    for c in key.chars() {
        if c.is_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = c.is_lowercase();
        out.extend(c.to_lowercase());
    }

    if let Some(stem) = out.strip_suffix("_l") {
        format!("{}_left", stem)
    } else if let Some(stem) = out.strip_suffix("_r") {
        format!("{}_right", stem)
    } else {
        out
    }
}

/// Decode a `/VMC/Ext/Bone/Pos` message
pub fn decode_bone_pos(msg: &OscMessage) -> Result<(BoneName, BoneTransform), DecodeError> {
    expect_shape(msg, BONE_POS, BONE_ARGS)?;

    let bone: BoneName = normalize_key(key_arg(&msg.args)?).parse()?;
    let mut n = [0f32; BONE_ARGS - 1];
    for (i, slot) in n.iter_mut().enumerate() {
        *slot = finite_arg(&msg.args, i + 1)?;
    }

    let transform = BoneTransform {
        position: Vec3::new(n[0], n[1], n[2]),
        rotation: Rotation::quaternion(n[3], n[4], n[5], n[6]),
    };
    Ok((bone, transform))
}

/// Decode a `/VMC/Ext/Blend/Val` message, clamping the weight into `[0, 1]`
pub fn decode_blend_val(msg: &OscMessage) -> Result<(ShapeName, f32), DecodeError> {
    expect_shape(msg, BLEND_VAL, BLEND_ARGS)?;

    let shape: ShapeName = normalize_key(key_arg(&msg.args)?).parse()?;
    let value = clamp_weight(number_arg(&msg.args, 1)?);
    Ok((shape, value))
}

/// Dispatch one message by address.
///
/// `Ok(None)` means a VMC message this relay has no use for (status pings,
/// blend "apply" markers, root transforms); anything outside the VMC
/// namespace is an error.
pub fn decode_message(msg: &OscMessage) -> Result<Option<PoseDelta>, DecodeError> {
    match msg.address.as_str() {
        BONE_POS => decode_bone_pos(msg).map(|(name, t)| Some(PoseDelta::Bone(name, t))),
        BLEND_VAL => decode_blend_val(msg).map(|(name, v)| Some(PoseDelta::Blend(name, v))),
        other if other.starts_with(VMC_PREFIX) => Ok(None),
        other => Err(DecodeError::UnknownAddress(other.to_string())),
    }
}

/// Everything one datagram decoded to
#[derive(Debug, Default, PartialEq)]
pub struct DecodedPacket {
    pub deltas: Vec<PoseDelta>,
    /// VMC messages with no pose content
    pub ignored: usize,
    pub errors: Vec<DecodeError>,
}

/// Decode one datagram, keeping every well-formed delta.
///
/// A bad message inside a bundle is recorded in `errors` and skipped; its
/// siblings still decode.
pub fn decode_packet(buf: &[u8]) -> DecodedPacket {
    let mut out = DecodedPacket::default();
    for msg in osc::decode_packet(buf) {
        match msg.and_then(|m| decode_message(&m)) {
            Ok(Some(delta)) => out.deltas.push(delta),
            Ok(None) => out.ignored += 1,
            Err(e) => out.errors.push(e),
        }
    }
    out
}

fn expect_shape(msg: &OscMessage, address: &'static str, arity: usize) -> Result<(), DecodeError> {
    if msg.address != address {
        return Err(DecodeError::UnknownAddress(msg.address.clone()));
    }
    if msg.args.len() != arity {
        return Err(DecodeError::Arity {
            address,
            expected: arity,
            actual: msg.args.len(),
        });
    }
    Ok(())
}

fn key_arg(args: &[OscArg]) -> Result<&str, DecodeError> {
    args[0].as_str().ok_or(DecodeError::ArgType {
        index: 0,
        expected: "string",
        found: args[0].type_name(),
    })
}

fn number_arg(args: &[OscArg], index: usize) -> Result<f32, DecodeError> {
    args[index].as_f32().ok_or(DecodeError::ArgType {
        index,
        expected: "number",
        found: args[index].type_name(),
    })
}

/// A numeric argument that survives the trip to JSON; `d` values beyond
/// `f32` range narrow to infinity and are refused here
fn finite_arg(args: &[OscArg], index: usize) -> Result<f32, DecodeError> {
    let value = number_arg(args, index)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DecodeError::ArgType {
            index,
            expected: "finite number",
            found: "non-finite number",
        })
    }
}
