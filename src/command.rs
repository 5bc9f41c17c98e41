// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Translation of inbound control messages into device writes.
//!
//! Control messages are free text of the form `<key>,<value>` where the key
//! is a data-point id or a schema name and the value is coerced by textual
//! convention. Translation distinguishes three non-failure outcomes so the
//! bridge loop never has to rely on error types for control flow: a real
//! command, "not a command at all" (ignored silently), and the retained
//! sentinel left behind after a previous dispatch.

use crate::datapoint::{DpId, DpValue};
use crate::error::CommandError;
use crate::schema::DeviceSchema;

/// The retained payload that marks a command as consumed.
///
/// After dispatching a command the bridge overwrites the command topic with
/// this value so a re-delivered retained message cannot re-trigger the write.
pub const COMMAND_SENTINEL: &str = "0";

/// A validated control command ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    /// The resolved data-point id.
    pub id: DpId,
    /// The coerced value to write.
    pub value: DpValue,
    /// The original message text, echoed to the `set/lastcommand` topic.
    pub raw: String,
}

/// Outcome of translating one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Translation {
    /// A valid command to dispatch to the device.
    Command(PendingCommand),
    /// The message has no `key,value` shape; not a command, ignore silently.
    NotACommand,
    /// The message is the consumed-command sentinel; ignore.
    Sentinel,
}

/// Translates one inbound control message.
///
/// Grammar: `<key>,<value>` split on the first comma.
///
/// - `<key>`: a decimal numeral is used directly as the data-point id;
///   anything else must resolve through [`DeviceSchema::name_to_id`].
/// - `<value>` coercion, first match wins: `true`/`false` (case-insensitive)
///   → boolean; leading `"` → the text between the first quote pair; all
///   digits → integer; otherwise the text passes through as a string.
///
/// # Errors
///
/// Returns [`CommandError`] for messages that look like commands but cannot
/// be dispatched: an unresolvable key, an empty key, or a quoted value with
/// no closing quote. These are recoverable; callers log and continue.
///
/// # Examples
///
/// ```
/// use dpbridge::{DeviceSchema, DpId, DpValue, Translation, translate};
///
/// let schema = DeviceSchema::from_pairs([(9, "temp")]);
///
/// let Translation::Command(cmd) = translate("5,true", &schema).unwrap() else {
///     panic!("expected a command");
/// };
/// assert_eq!(cmd.id, DpId::new(5));
/// assert_eq!(cmd.value, DpValue::Bool(true));
/// ```
pub fn translate(payload: &str, schema: &DeviceSchema) -> Result<Translation, CommandError> {
    if payload == COMMAND_SENTINEL {
        return Ok(Translation::Sentinel);
    }

    let Some((key, value)) = payload.split_once(',') else {
        return Ok(Translation::NotACommand);
    };

    if key.is_empty() {
        return Err(CommandError::EmptyKey);
    }

    let id = resolve_key(key, schema)?;
    let value = coerce_value(value)?;

    Ok(Translation::Command(PendingCommand {
        id,
        value,
        raw: payload.to_string(),
    }))
}

/// Resolves a command key: decimal id first, then schema name.
fn resolve_key(key: &str, schema: &DeviceSchema) -> Result<DpId, CommandError> {
    if key.bytes().all(|b| b.is_ascii_digit()) {
        return key
            .parse()
            .map_err(|_| CommandError::UnresolvedKey(key.to_string()));
    }

    schema
        .name_to_id(key)
        .ok_or_else(|| CommandError::UnresolvedKey(key.to_string()))
}

/// Coerces a command value per the textual convention.
fn coerce_value(value: &str) -> Result<DpValue, CommandError> {
    if value.eq_ignore_ascii_case("true") {
        return Ok(DpValue::Bool(true));
    }
    if value.eq_ignore_ascii_case("false") {
        return Ok(DpValue::Bool(false));
    }

    if let Some(rest) = value.strip_prefix('"') {
        let Some((text, _)) = rest.split_once('"') else {
            return Err(CommandError::UnterminatedValue(value.to_string()));
        };
        return Ok(DpValue::Text(text.to_string()));
    }

    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(number) = value.parse() {
            return Ok(DpValue::Int(number));
        }
    }

    Ok(DpValue::Text(value.to_string()))
}
