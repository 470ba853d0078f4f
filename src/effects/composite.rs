use crate::foundation::error::{MontageError, MontageResult};
use crate::foundation::math::{mul_div255_u8, unit_to_u8_weight};

/// Blend two RGB8 pixels: `t = 0` returns `a`, `t = 1` returns `b`.
pub fn crossfade(a: [u8; 3], b: [u8; 3], t: f32) -> [u8; 3] {
    let tt = unit_to_u8_weight(t);
    let it = 255u16 - tt;

    let mut out = [0u8; 3];
    for i in 0..3 {
        let av = mul_div255_u8(u16::from(a[i]), it);
        let bv = mul_div255_u8(u16::from(b[i]), tt);
        out[i] = av.saturating_add(bv);
    }
    out
}

/// Crossfade `incoming` into `dst` (the outgoing frame) with incoming opacity `t`.
pub fn crossfade_in_place(dst: &mut [u8], incoming: &[u8], t: f32) -> MontageResult<()> {
    if dst.len() != incoming.len() || !dst.len().is_multiple_of(3) {
        return Err(MontageError::evaluation(
            "crossfade_in_place expects equal-length rgb8 buffers",
        ));
    }
    for (d, s) in dst.chunks_exact_mut(3).zip(incoming.chunks_exact(3)) {
        let out = crossfade([d[0], d[1], d[2]], [s[0], s[1], s[2]], t);
        d.copy_from_slice(&out);
    }
    Ok(())
}

/// Scale every channel by `factor` (blend toward black).
pub fn darken_in_place(buf: &mut [u8], factor: f32) {
    let w = unit_to_u8_weight(factor);
    if w == 255 {
        return;
    }
    for v in buf.iter_mut() {
        *v = mul_div255_u8(u16::from(*v), w);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/effects/composite.rs"]
mod tests;
