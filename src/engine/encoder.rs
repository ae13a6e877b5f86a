//! Batch (SIMD integer), base-2 integer and real-number encoders.

use std::f64::consts::PI;
use std::sync::Arc;

use num_bigint::BigUint;
use num_traits::{FromPrimitive, ToPrimitive};

use crate::engine::cipher::Plaintext;
use crate::engine::params::ContextData;
use crate::native::{NativeError, NativeResult, SchemeType};
use crate::vector::{ElementType, HostArray};

fn integer_values(values: &HostArray) -> NativeResult<Vec<i128>> {
    Ok(match values {
        HostArray::Int32(v) => v.iter().map(|&x| x as i128).collect(),
        HostArray::UInt32(v) => v.iter().map(|&x| x as i128).collect(),
        HostArray::Int64(v) => v.iter().map(|&x| x as i128).collect(),
        HostArray::UInt64(v) => v.iter().map(|&x| x as i128).collect(),
        HostArray::Float64(_) => {
            return Err(NativeError::new("integer encoders cannot encode floating-point values"))
        }
    })
}

fn integer_array(values: Vec<i128>, element_type: ElementType) -> NativeResult<HostArray> {
    fn narrow<T: TryFrom<i128>>(values: Vec<i128>, element_type: ElementType) -> NativeResult<Vec<T>> {
        values
            .into_iter()
            .map(|v| {
                T::try_from(v).map_err(|_| NativeError::new(format!("decoded value {v} does not fit in {element_type}")))
            })
            .collect()
    }
    Ok(match element_type {
        ElementType::Int32 => HostArray::Int32(narrow(values, element_type)?),
        ElementType::UInt32 => HostArray::UInt32(narrow(values, element_type)?),
        ElementType::Int64 => HostArray::Int64(narrow(values, element_type)?),
        ElementType::UInt64 => HostArray::UInt64(narrow(values, element_type)?),
        ElementType::Float64 => HostArray::Float64(values.into_iter().map(|v| v as f64).collect()),
    })
}

fn require_scheme(ctx: &ContextData, scheme: SchemeType, encoder: &str) -> NativeResult<()> {
    if ctx.scheme() != scheme {
        return Err(NativeError::new(format!("{encoder} requires the {scheme} scheme")));
    }
    ctx.tables().map(|_| ())
}

/// SIMD encoder: one plaintext-modulus value per slot, N slots.
#[derive(Debug)]
pub struct BatchEncoder {
    ctx: Arc<ContextData>,
}

impl BatchEncoder {
    pub fn new(ctx: Arc<ContextData>) -> NativeResult<Self> {
        require_scheme(&ctx, SchemeType::Bfv, "batch encoder")?;
        if ctx.tables()?.plain_plan.is_none() {
            return Err(NativeError::new("encryption parameters are not valid for batching"));
        }
        Ok(Self { ctx })
    }

    pub fn slot_count(&self) -> usize {
        self.ctx.poly_degree()
    }

    pub fn encode(&self, values: &HostArray) -> NativeResult<Plaintext> {
        let tables = self.ctx.tables()?;
        let plan = tables
            .plain_plan
            .as_ref()
            .ok_or_else(|| NativeError::new("encryption parameters are not valid for batching"))?;
        let n = self.slot_count();
        if values.len() > n {
            return Err(NativeError::new(format!("values has size larger than slot count {n}")));
        }
        let t = tables.plain_modulus;
        let signed = values.element_type().is_signed();
        let bound = if signed { (t as i128 - 1) / 2 } else { t as i128 - 1 };

        let mut slots = vec![0u64; n];
        for (slot, v) in slots.iter_mut().zip(integer_values(values)?) {
            if v.abs() > bound || (!signed && v < 0) {
                return Err(NativeError::new(format!("value {v} is out of range for plain_modulus {t}")));
            }
            *slot = v.rem_euclid(t as i128) as u64;
        }
        plan.inv(&mut slots);
        plan.normalize(&mut slots);
        Ok(Plaintext::Integer { parms_id: self.ctx.parms_id().clone(), coeffs: slots })
    }

    pub fn decode(&self, plaintext: &Plaintext, element_type: ElementType) -> NativeResult<HostArray> {
        if !element_type.is_integer() {
            return Err(NativeError::new("batch encoder cannot decode into floating-point values"));
        }
        let tables = self.ctx.tables()?;
        let plan = tables
            .plain_plan
            .as_ref()
            .ok_or_else(|| NativeError::new("encryption parameters are not valid for batching"))?;
        let mut slots = plaintext.integer_coeffs(self.ctx.parms_id())?.to_vec();
        plan.fwd(&mut slots);

        let t = tables.plain_modulus;
        let values = slots
            .into_iter()
            .map(|v| {
                if element_type.is_signed() && v > t / 2 {
                    v as i128 - t as i128
                } else {
                    v as i128
                }
            })
            .collect();
        integer_array(values, element_type)
    }
}

/// Base-2 encoder of a single signed integer into polynomial coefficients.
#[derive(Debug)]
pub struct IntegerEncoder {
    ctx: Arc<ContextData>,
}

impl IntegerEncoder {
    pub fn new(ctx: Arc<ContextData>) -> NativeResult<Self> {
        require_scheme(&ctx, SchemeType::Bfv, "integer encoder")?;
        Ok(Self { ctx })
    }

    pub fn encode(&self, value: i64) -> NativeResult<Plaintext> {
        let tables = self.ctx.tables()?;
        let n = self.ctx.poly_degree();
        let t = tables.plain_modulus;
        let magnitude = value.unsigned_abs();
        let bits = 64 - magnitude.leading_zeros() as usize;
        if bits > n {
            return Err(NativeError::new("value is too large to encode"));
        }
        let digit = if value < 0 { t - 1 } else { 1 };
        let coeffs = (0..n)
            .map(|i| if i < bits && (magnitude >> i) & 1 == 1 { digit } else { 0 })
            .collect();
        Ok(Plaintext::Integer { parms_id: self.ctx.parms_id().clone(), coeffs })
    }

    pub fn decode(&self, plaintext: &Plaintext) -> NativeResult<i64> {
        let t = self.ctx.tables()?.plain_modulus;
        let coeffs = plaintext.integer_coeffs(self.ctx.parms_id())?;
        let overflow = || NativeError::new("output out of range");
        let mut acc: i128 = 0;
        for (i, &c) in coeffs.iter().enumerate() {
            if c == 0 {
                continue;
            }
            let centered = if c > t / 2 { c as i128 - t as i128 } else { c as i128 };
            if i >= 126 {
                return Err(overflow());
            }
            let term = centered.checked_mul(1i128 << i).ok_or_else(overflow)?;
            acc = acc.checked_add(term).ok_or_else(overflow)?;
        }
        i64::try_from(acc).map_err(|_| overflow())
    }
}

/// Twist factors, bit reversal and per-stage twiddles for the size-N FFT
/// behind the canonical embedding.
#[derive(Debug, Clone)]
struct FftTables {
    n: usize,
    twist_re: Vec<f64>,
    twist_im: Vec<f64>,
    bit_rev: Vec<usize>,
    twiddle_re: Vec<Vec<f64>>,
    twiddle_im: Vec<Vec<f64>>,
}

impl FftTables {
    fn new(n: usize) -> Self {
        let log_n = n.trailing_zeros();
        // ζ^j = e^{πij/N}
        let (twist_re, twist_im): (Vec<f64>, Vec<f64>) = (0..n)
            .map(|j| {
                let angle = PI * j as f64 / n as f64;
                (angle.cos(), angle.sin())
            })
            .unzip();
        let bit_rev = (0..n)
            .map(|i| if log_n == 0 { 0 } else { i.reverse_bits() >> (usize::BITS - log_n) })
            .collect();
        let (twiddle_re, twiddle_im): (Vec<Vec<f64>>, Vec<Vec<f64>>) = (0..log_n)
            .map(|s| {
                let half_len = 1usize << s;
                let stage: (Vec<f64>, Vec<f64>) = (0..half_len)
                    .map(|k| {
                        let angle = -PI * k as f64 / half_len as f64;
                        (angle.cos(), angle.sin())
                    })
                    .unzip();
                stage
            })
            .unzip();
        Self { n, twist_re, twist_im, bit_rev, twiddle_re, twiddle_im }
    }

    /// In-place radix-2 decimation-in-time FFT, X[k] = Σ x[j]·e^{-2πijk/N}.
    fn fft(&self, re: &mut [f64], im: &mut [f64]) {
        let n = self.n;
        for i in 0..n {
            let j = self.bit_rev[i];
            if i < j {
                re.swap(i, j);
                im.swap(i, j);
            }
        }
        for (s, (tw_re, tw_im)) in self.twiddle_re.iter().zip(&self.twiddle_im).enumerate() {
            let half_len = 1usize << s;
            for start in (0..n).step_by(half_len << 1) {
                for k in 0..half_len {
                    let (w_re, w_im) = (tw_re[k], tw_im[k]);
                    let i0 = start + k;
                    let i1 = i0 + half_len;
                    let v_re = w_re * re[i1] - w_im * im[i1];
                    let v_im = w_re * im[i1] + w_im * re[i1];
                    let (u_re, u_im) = (re[i0], im[i0]);
                    re[i0] = u_re + v_re;
                    im[i0] = u_im + v_im;
                    re[i1] = u_re - v_re;
                    im[i1] = u_im - v_im;
                }
            }
        }
    }
}

/// Approximate real-number encoder over the canonical embedding.
///
/// The embedding has N/2 complex slots; consecutive reals are packed as the
/// (real, imaginary) parts of one slot, so N reals fit in one plaintext.
#[derive(Debug)]
pub struct RealEncoder {
    ctx: Arc<ContextData>,
    fft: FftTables,
}

impl RealEncoder {
    pub fn new(ctx: Arc<ContextData>) -> NativeResult<Self> {
        require_scheme(&ctx, SchemeType::Ckks, "real-number encoder")?;
        let fft = FftTables::new(ctx.poly_degree());
        Ok(Self { ctx, fft })
    }

    /// Complex slots of the embedding.
    pub fn slot_count(&self) -> usize {
        self.ctx.poly_degree() / 2
    }

    pub fn encode(&self, values: &HostArray, scale: f64) -> NativeResult<Plaintext> {
        let basis = &self.ctx.tables()?.basis;
        let n = self.fft.n;
        if values.len() > n {
            return Err(NativeError::new(format!("values has size larger than {n}")));
        }
        let total_bits = basis.product_bits() as f64;
        if !(scale.is_finite() && scale > 0.0) || scale.log2() + 1.0 >= total_bits {
            return Err(NativeError::new("scale out of bounds"));
        }

        // z̃[k] = x[2k] + i·x[2k+1], z̃[N-1-k] = conj(z̃[k])
        let reals = values.to_f64_vec();
        let mut z_re = vec![0.0f64; n];
        let mut z_im = vec![0.0f64; n];
        for k in 0..self.slot_count() {
            let re = reals.get(2 * k).copied().unwrap_or(0.0);
            let im = reals.get(2 * k + 1).copied().unwrap_or(0.0);
            z_re[k] = re;
            z_im[k] = im;
            z_re[n - 1 - k] = re;
            z_im[n - 1 - k] = -im;
        }
        self.fft.fft(&mut z_re, &mut z_im);

        // m[j] = Re(a[j]·ζ^{-j}) with a = FFT(z̃) / N
        let inv_n = 1.0 / n as f64;
        let max_bits = total_bits - 1.0;
        let mut limbs = vec![vec![0u64; n]; basis.len()];
        for j in 0..n {
            let m = (z_re[j] * self.fft.twist_re[j] + z_im[j] * self.fft.twist_im[j]) * inv_n;
            let coeff = (m * scale).round();
            if !coeff.is_finite() || (coeff != 0.0 && coeff.abs().log2() >= max_bits) {
                return Err(NativeError::new("encoded values are too large"));
            }
            write_residues(&mut limbs, j, coeff, basis.moduli())?;
        }
        let poly = basis.from_coeff_limbs(limbs);
        Ok(Plaintext::Real { parms_id: self.ctx.parms_id().clone(), poly, scale })
    }

    pub fn decode(&self, plaintext: &Plaintext, element_type: ElementType) -> NativeResult<HostArray> {
        let basis = &self.ctx.tables()?.basis;
        let (poly, scale) = plaintext.real_poly(self.ctx.parms_id())?;
        let n = self.fft.n;
        let q = basis.product();
        let half = basis.half_product();

        let mut b_re = vec![0.0f64; n];
        let mut b_im = vec![0.0f64; n];
        for (j, x) in basis.reconstruct(poly).into_iter().enumerate() {
            let signed = if &x > half {
                -(q - &x).to_f64().unwrap_or(f64::INFINITY)
            } else {
                x.to_f64().unwrap_or(f64::INFINITY)
            };
            let m = signed / scale;
            // conj(a[j]) = m[j]·conj(ζ^j)
            b_re[j] = m * self.fft.twist_re[j];
            b_im[j] = -m * self.fft.twist_im[j];
        }
        self.fft.fft(&mut b_re, &mut b_im);

        // z̃[k] = conj(FFT(conj(a))[k])
        let mut reals = Vec::with_capacity(n);
        for k in 0..self.slot_count() {
            reals.push(b_re[k]);
            reals.push(-b_im[k]);
        }
        if reals.iter().any(|v| !v.is_finite()) {
            return Err(NativeError::new("decoded values are not finite"));
        }
        match element_type {
            ElementType::Float64 => Ok(HostArray::Float64(reals)),
            integer => integer_array(reals.into_iter().map(|v| v.round() as i128).collect(), integer),
        }
    }
}

fn write_residues(limbs: &mut [Vec<u64>], j: usize, coeff: f64, moduli: &[u64]) -> NativeResult<()> {
    let negative = coeff < 0.0;
    let magnitude = coeff.abs();
    if magnitude < (1u64 << 62) as f64 {
        let value = magnitude as u64;
        for (limb, &q) in limbs.iter_mut().zip(moduli) {
            let r = value % q;
            limb[j] = if negative && r != 0 { q - r } else { r };
        }
    } else {
        let value = BigUint::from_f64(magnitude)
            .ok_or_else(|| NativeError::new("encoded values are too large"))?;
        for (limb, &q) in limbs.iter_mut().zip(moduli) {
            let r = (&value % q).to_u64().unwrap_or(0);
            limb[j] = if negative && r != 0 { q - r } else { r };
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::modulus::create_coeff_modulus;
    use crate::engine::params::EncryptionParameters;
    use crate::native::SecurityLevel;

    fn bfv_context(plain: u64) -> Arc<ContextData> {
        let params = EncryptionParameters {
            scheme: SchemeType::Bfv,
            poly_degree: 1024,
            coeff_modulus: create_coeff_modulus(1024, &[27]).unwrap(),
            plain_modulus: Some(plain),
        };
        Arc::new(ContextData::new(params, true, SecurityLevel::Tc128))
    }

    fn ckks_context() -> Arc<ContextData> {
        let params = EncryptionParameters {
            scheme: SchemeType::Ckks,
            poly_degree: 4096,
            coeff_modulus: create_coeff_modulus(4096, &[36, 36, 37]).unwrap(),
            plain_modulus: None,
        };
        Arc::new(ContextData::new(params, true, SecurityLevel::Tc128))
    }

    #[test]
    fn test_batch_roundtrip_signed_and_unsigned() {
        let encoder = BatchEncoder::new(bfv_context(12289)).unwrap();
        assert_eq!(encoder.slot_count(), 1024);

        let values = HostArray::Int64(vec![-6144, -1, 0, 1, 6144]);
        let pt = encoder.encode(&values).unwrap();
        let mut decoded = encoder.decode(&pt, ElementType::Int64).unwrap();
        assert_eq!(decoded.len(), 1024);
        decoded.truncate(5);
        assert_eq!(decoded, values);

        let values = HostArray::UInt32(vec![12288, 7, 3]);
        let pt = encoder.encode(&values).unwrap();
        let mut decoded = encoder.decode(&pt, ElementType::UInt32).unwrap();
        decoded.truncate(3);
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_batch_rejects_out_of_range() {
        let encoder = BatchEncoder::new(bfv_context(12289)).unwrap();
        assert!(encoder.encode(&HostArray::UInt64(vec![12289])).is_err());
        assert!(encoder.encode(&HostArray::Int32(vec![-6145])).is_err());
        assert!(encoder.encode(&HostArray::Float64(vec![1.0])).is_err());
    }

    #[test]
    fn test_batch_requires_batching_modulus() {
        assert!(BatchEncoder::new(bfv_context(256)).is_err());
        assert!(IntegerEncoder::new(bfv_context(256)).is_ok());
    }

    #[test]
    fn test_integer_encoder_roundtrip() {
        let encoder = IntegerEncoder::new(bfv_context(256)).unwrap();
        for value in [0i64, 1, -1, 5, -123456789, i64::MAX, i64::MIN + 1] {
            let pt = encoder.encode(value).unwrap();
            assert_eq!(encoder.decode(&pt).unwrap(), value);
        }
        if let Plaintext::Integer { coeffs, .. } = encoder.encode(-5).unwrap() {
            assert_eq!(&coeffs[..3], &[255, 0, 255]);
        } else {
            panic!("integer encoder produced a non-integer plaintext");
        }
    }

    #[test]
    fn test_real_roundtrip() {
        let encoder = RealEncoder::new(ckks_context()).unwrap();
        assert_eq!(encoder.slot_count(), 2048);

        let values: Vec<f64> = (0..4096).map(|i| (i as f64) * 0.25 - 300.0).collect();
        let pt = encoder.encode(&HostArray::Float64(values.clone()), 2f64.powi(40)).unwrap();
        let decoded = encoder.decode(&pt, ElementType::Float64).unwrap().into_vec::<f64>().unwrap();
        assert_eq!(decoded.len(), 4096);
        for (a, b) in values.iter().zip(&decoded) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
    }

    #[test]
    fn test_real_integer_elements_round_on_decode() {
        let encoder = RealEncoder::new(ckks_context()).unwrap();
        let values = HostArray::Int32(vec![-7, 0, 42]);
        let pt = encoder.encode(&values, 2f64.powi(30)).unwrap();
        let mut decoded = encoder.decode(&pt, ElementType::Int32).unwrap();
        decoded.truncate(3);
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_real_scale_bounds() {
        let encoder = RealEncoder::new(ckks_context()).unwrap();
        let values = HostArray::Float64(vec![1.0]);
        assert!(encoder.encode(&values, 0.0).is_err());
        assert!(encoder.encode(&values, 2f64.powi(120)).is_err());
        assert!(encoder.encode(&HostArray::Float64(vec![1e30]), 2f64.powi(100)).is_err());
    }

    #[test]
    fn test_real_large_scale_uses_wide_residues() {
        let encoder = RealEncoder::new(ckks_context()).unwrap();
        let values = HostArray::Float64(vec![3.5, -2.25]);
        let pt = encoder.encode(&values, 2f64.powi(80)).unwrap();
        let decoded = encoder.decode(&pt, ElementType::Float64).unwrap().into_vec::<f64>().unwrap();
        assert!((decoded[0] - 3.5).abs() < 1e-9);
        assert!((decoded[1] + 2.25).abs() < 1e-9);
    }

    #[test]
    fn test_encoders_check_scheme() {
        assert!(RealEncoder::new(bfv_context(12289)).is_err());
        assert!(BatchEncoder::new(ckks_context()).is_err());
    }
}
