//! Causal convolution and correlation along the time axis.
//!
//! The convolution `y[t] = Σ_k f[k]·s[t−k]` and the correlation
//! `z[t] = Σ_k f[k]·s[t+k]` form an exact adjoint pair on a fixed-length
//! time grid: `<conv(s), y> == <s, xcorr(y)>` for any kernel `f`.
//!
//! Short kernels use the direct loops; long records route through rustfft
//! (convention matches numpy: unnormalized forward, 1/n inverse).

use ndarray::Array1;
use num_complex::Complex64;
use rustfft::FftPlanner;

/// Above this work estimate the FFT path is cheaper than the direct loop.
const FFT_CROSSOVER: usize = 1 << 14;

/// Causal convolution of `signal` (length nt) with `kernel` (length nf),
/// truncated to nt samples.
pub fn conv_causal(signal: &Array1<f64>, kernel: &Array1<f64>, out: &mut Array1<f64>) {
    let nt = signal.len();
    debug_assert_eq!(out.len(), nt);
    if nt * kernel.len() > FFT_CROSSOVER {
        return conv_fft(signal, kernel, out, false);
    }
    for it in 0..nt {
        let mut acc = 0.0;
        let kmax = kernel.len().min(it + 1);
        for k in 0..kmax {
            acc += kernel[k] * signal[it - k];
        }
        out[it] = acc;
    }
}

/// Adjoint of [`conv_causal`] with the same kernel:
/// `out[t] = Σ_k kernel[k]·signal[t+k]`.
pub fn xcorr_causal(signal: &Array1<f64>, kernel: &Array1<f64>, out: &mut Array1<f64>) {
    let nt = signal.len();
    debug_assert_eq!(out.len(), nt);
    if nt * kernel.len() > FFT_CROSSOVER {
        return conv_fft(signal, kernel, out, true);
    }
    for it in 0..nt {
        let mut acc = 0.0;
        let kmax = kernel.len().min(nt - it);
        for k in 0..kmax {
            acc += kernel[k] * signal[it + k];
        }
        out[it] = acc;
    }
}

/// Kernel gradient of the convolution: given the forward input `signal`
/// and a data-side residual, `out[k] = Σ_t residual[t]·signal[t−k]`.
/// This is the adjoint of `kernel ↦ conv_causal(signal, kernel)`.
pub fn conv_kernel_adjoint(signal: &Array1<f64>, residual: &Array1<f64>, out: &mut Array1<f64>) {
    let nt = signal.len();
    debug_assert_eq!(residual.len(), nt);
    for k in 0..out.len() {
        let mut acc = 0.0;
        for it in k..nt {
            acc += residual[it] * signal[it - k];
        }
        out[k] = acc;
    }
}

fn conv_fft(signal: &Array1<f64>, kernel: &Array1<f64>, out: &mut Array1<f64>, adjoint: bool) {
    let nt = signal.len();
    let n = (nt + kernel.len()).next_power_of_two();
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    let ifft = planner.plan_fft_inverse(n);

    let mut s: Vec<Complex64> = (0..n)
        .map(|i| Complex64::new(if i < nt { signal[i] } else { 0.0 }, 0.0))
        .collect();
    let mut f: Vec<Complex64> = (0..n)
        .map(|i| Complex64::new(if i < kernel.len() { kernel[i] } else { 0.0 }, 0.0))
        .collect();
    fft.process(&mut s);
    fft.process(&mut f);
    for i in 0..n {
        // Correlation conjugates the kernel spectrum.
        s[i] *= if adjoint { f[i].conj() } else { f[i] };
    }
    ifft.process(&mut s);
    let norm = 1.0 / n as f64;
    for it in 0..nt {
        out[it] = s[it].re * norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize, scale: f64) -> Array1<f64> {
        Array1::from_iter((0..n).map(|i| ((i * i + 3) as f64).sin() * scale))
    }

    #[test]
    fn test_conv_delta_is_identity() {
        let s = ramp(25, 1.0);
        let delta = Array1::from_vec(vec![1.0, 0.0, 0.0]);
        let mut y = Array1::zeros(25);
        conv_causal(&s, &delta, &mut y);
        for i in 0..25 {
            assert!((y[i] - s[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_conv_delayed_delta_shifts() {
        let s = ramp(25, 1.0);
        let delayed = Array1::from_vec(vec![0.0, 0.0, 1.0]);
        let mut y = Array1::zeros(25);
        conv_causal(&s, &delayed, &mut y);
        assert!((y[0]).abs() < 1e-15);
        assert!((y[1]).abs() < 1e-15);
        for i in 2..25 {
            assert!((y[i] - s[i - 2]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_conv_xcorr_adjoint_pair() {
        let s = ramp(25, 1.3);
        let d = ramp(25, -0.7);
        let kernel = ramp(5, 0.9);
        let mut cs = Array1::zeros(25);
        let mut xd = Array1::zeros(25);
        conv_causal(&s, &kernel, &mut cs);
        xcorr_causal(&d, &kernel, &mut xd);
        let lhs: f64 = cs.iter().zip(d.iter()).map(|(a, b)| a * b).sum();
        let rhs: f64 = s.iter().zip(xd.iter()).map(|(a, b)| a * b).sum();
        assert!(
            (lhs - rhs).abs() < 1e-10 * lhs.abs().max(1.0),
            "<Fs, d> = {lhs}, <s, F*d> = {rhs}"
        );
    }

    #[test]
    fn test_kernel_adjoint_pair() {
        let s = ramp(40, 1.0);
        let res = ramp(40, 0.6);
        let kernel = ramp(7, -1.1);
        let mut fwd = Array1::zeros(40);
        conv_causal(&s, &kernel, &mut fwd);
        let mut gk = Array1::zeros(7);
        conv_kernel_adjoint(&s, &res, &mut gk);
        let lhs: f64 = fwd.iter().zip(res.iter()).map(|(a, b)| a * b).sum();
        let rhs: f64 = kernel.iter().zip(gk.iter()).map(|(a, b)| a * b).sum();
        assert!((lhs - rhs).abs() < 1e-10 * lhs.abs().max(1.0));
    }

    #[test]
    fn test_fft_path_matches_direct() {
        // Force the FFT branch with a long record, then compare against the
        // direct loop on the same input.
        let nt = 4096;
        let s = ramp(nt, 1.0);
        let kernel = ramp(8, 0.5);
        let mut via_fft = Array1::zeros(nt);
        conv_causal(&s, &kernel, &mut via_fft);

        let mut direct = Array1::zeros(nt);
        for it in 0..nt {
            let mut acc = 0.0;
            for k in 0..kernel.len().min(it + 1) {
                acc += kernel[k] * s[it - k];
            }
            direct[it] = acc;
        }
        for i in 0..nt {
            assert!(
                (via_fft[i] - direct[i]).abs() < 1e-8,
                "FFT path diverges at {i}: {} vs {}",
                via_fft[i],
                direct[i]
            );
        }
    }
}
