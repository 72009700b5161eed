//! Leaf classification for spent covenant outputs.
//!
//! Once a funding output is spent, the only signal telling which covenant branch
//! was taken is the shape of the leaf script carried in the spending witness. The
//! leaf sits at position `len - 2` of the witness stack (the last item is the
//! control block). Each branch decompiles into a fixed number of script items:
//!
//! | items | operation |
//! |-------|-----------|
//! | 37    | liquidate |
//! | 47    | redeem    |
//! | 27    | topup     |
//!
//! Any other count is unrecognized.

use tracing::debug;

pub const LIQUIDATE_LEAF_ITEMS: usize = 37;
pub const REDEEM_LEAF_ITEMS: usize = 47;
pub const TOPUP_LEAF_ITEMS: usize = 27;

const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;

/// Covenant branch used to spend a funding output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafOperation {
	Liquidate,
	Redeem,
	Topup,
	Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassificationError {
	#[error("Witness stack has {0} items, need at least 2")]
	WitnessTooShort(usize),

	#[error("Push at offset {offset} needs {needed} bytes, {available} available")]
	TruncatedPush {
		offset: usize,
		needed: usize,
		available: usize,
	},
}

/// Select the leaf script from a witness stack.
pub fn leaf_script(witness: &[Vec<u8>]) -> Result<&[u8], ClassificationError> {
	if witness.len() < 2 {
		return Err(ClassificationError::WitnessTooShort(witness.len()));
	}
	Ok(&witness[witness.len() - 2])
}

/// Count the items a script decompiles into: one per opcode, one per data push.
pub fn count_script_items(script: &[u8]) -> Result<usize, ClassificationError> {
	let mut items = 0;
	let mut cursor = 0;

	while cursor < script.len() {
		let offset = cursor;
		let opcode = script[cursor];
		cursor += 1;

		let (length_bytes, push_len) = match opcode {
			0x01..=0x4b => (0, opcode as usize),
			OP_PUSHDATA1 => (1, read_le(script, cursor, 1, offset)?),
			OP_PUSHDATA2 => (2, read_le(script, cursor, 2, offset)?),
			OP_PUSHDATA4 => (4, read_le(script, cursor, 4, offset)?),
			_ => (0, 0),
		};
		cursor += length_bytes;

		let available = script.len() - cursor;
		if push_len > available {
			return Err(ClassificationError::TruncatedPush {
				offset,
				needed: push_len,
				available,
			});
		}
		cursor += push_len;
		items += 1;
	}

	Ok(items)
}

fn read_le(
	script: &[u8],
	start: usize,
	width: usize,
	offset: usize,
) -> Result<usize, ClassificationError> {
	let bytes = script
		.get(start..start + width)
		.ok_or(ClassificationError::TruncatedPush {
			offset,
			needed: width,
			available: script.len().saturating_sub(start),
		})?;
	Ok(bytes
		.iter()
		.rev()
		.fold(0usize, |acc, byte| (acc << 8) | *byte as usize))
}

/// Map a decompiled item count to the covenant operation it fingerprints.
pub fn operation_for_item_count(items: usize) -> LeafOperation {
	match items {
		LIQUIDATE_LEAF_ITEMS => LeafOperation::Liquidate,
		REDEEM_LEAF_ITEMS => LeafOperation::Redeem,
		TOPUP_LEAF_ITEMS => LeafOperation::Topup,
		_ => LeafOperation::Unrecognized,
	}
}

pub fn classify_leaf(script: &[u8]) -> Result<LeafOperation, ClassificationError> {
	count_script_items(script).map(operation_for_item_count)
}

/// Classify the spending witness of a funding output.
///
/// Malformed witnesses classify as [`LeafOperation::Unrecognized`].
pub fn classify_witness(witness: &[Vec<u8>]) -> LeafOperation {
	match leaf_script(witness).and_then(classify_leaf) {
		Ok(operation) => operation,
		Err(e) => {
			debug!("Unclassifiable spending witness: {}", e);
			LeafOperation::Unrecognized
		}
	}
}
