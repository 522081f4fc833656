//! Live-tree merge engine.
//!
//! [`merge`] synchronizes a destination tree from a source tree directly,
//! with the same shape-preserving rules the loader applies to documents:
//! the destination's structure wins, matching fields reconcile recursively,
//! sequences grow to the source length with deep-copied extras, primitives
//! adopt or coerce, and anything irreconcilable is left unchanged. No
//! document, no array store, and no type registry are involved, since both
//! sides are already live, concrete values.

use arbor_tree::{Composite, Node, Sequence};

/// Merge `src` into `dst` in place and return `dst`.
///
/// The destination keeps its own structure: fields the source does not
/// have survive untouched, and source fields the destination does not know
/// are ignored.
pub fn merge<'a>(dst: &'a mut dyn Node, src: &dyn Node) -> &'a mut dyn Node {
    merge_value(dst, src);
    dst
}

fn merge_value(dst: &mut dyn Node, src: &dyn Node) {
    // Both expose field mappings: walk the destination's fields and pull
    // the ones the source also has.
    if dst.as_composite().is_some() && src.as_composite().is_some() {
        let dcomp = dst.as_composite_mut().expect("checked composite");
        let scomp = src.as_composite().expect("checked composite");
        for name in dcomp.field_names() {
            let Some(source) = scomp.field(&name) else {
                continue;
            };
            if let Some(target) = dcomp.field_mut(&name) {
                merge_value(target, source);
            }
        }
        return;
    }

    // Both sequences: reconcile index-wise, extend with copies of the
    // source's extras, keep the destination's own tail.
    if dst.as_sequence().is_some() && src.as_sequence().is_some() {
        let dseq = dst.as_sequence_mut().expect("checked sequence");
        let sseq = src.as_sequence().expect("checked sequence");
        let dst_len = dseq.len();
        for i in 0..sseq.len() {
            let Some(source) = sseq.get(i) else {
                continue;
            };
            if i < dst_len {
                if let Some(target) = dseq.get_mut(i) {
                    merge_value(target, source);
                }
            } else if let Some(mut fresh) = dseq.new_element() {
                merge_value(fresh.as_mut(), source);
                dseq.push(fresh);
            } else {
                dseq.push(source.clone_node());
            }
        }
        return;
    }

    // Primitive destination: adopt on matching type, coerce otherwise, and
    // leave unchanged when neither applies.
    if dst.as_scalar().is_some() {
        if let Some(scalar) = src.as_scalar() {
            dst.set_scalar(&scalar);
        }
        return;
    }

    // Matching array types copy wholesale.
    if dst.as_tensor().is_some() {
        if let Some(source) = src.as_tensor() {
            if let Some(target) = dst.as_tensor_mut() {
                *target = source.clone();
            }
        }
    }

    // Nothing more we can do; the destination stays as it is.
}
