/**
 * Bracketed root refinement (Brent's method), outward-doubling bracket
 * search, and a derivative-based global minimizer. These are the root and
 * minimization primitives behind EnforceFixedQ and the Rafikov Q evaluation.
 */

const MAX_BRACKET_ITER: usize = 400;
const MAX_REFINE_ITER: usize = 200;
const INTERVAL_REL_TOL: f64 = 1.0e-12;
const RESIDUAL_TOL: f64 = 1.0e-10;


#[derive(thiserror::Error, Debug)]
pub enum RootError {

    #[error("failed to bracket a root: low={low} high={high} f(low)={flow} f(high)={fhigh}")]
    BracketFailed { low: f64, high: f64, flow: f64, fhigh: f64 },

    #[error("root refinement did not converge within {0} iterations")]
    NoConvergence(usize),
}


/**
 * Brent refinement on a sign-changing interval [a, b]. Converges when the
 * bracket shrinks below a relative tolerance or the residual vanishes.
 */
pub fn brent<F: FnMut(f64) -> f64>(mut f: F, mut a: f64, mut b: f64) -> Result<f64, RootError> {
    let mut fa = f(a);
    let mut fb = f(b);
    if fa * fb > 0.0 {
        return Err(RootError::BracketFailed { low: a, high: b, flow: fa, fhigh: fb });
    }
    if fa.abs() < fb.abs() {
        std::mem::swap(&mut a, &mut b);
        std::mem::swap(&mut fa, &mut fb);
    }
    let mut c = a;
    let mut fc = fa;
    let mut d = b - a;
    let mut mflag = true;

    for _ in 0..MAX_REFINE_ITER {
        if fb == 0.0 || (b - a).abs() <= INTERVAL_REL_TOL * b.abs().max(1.0e-300) {
            return Ok(b);
        }
        let mut s = if fa != fc && fb != fc {
            // inverse quadratic interpolation
            a * fb * fc / ((fa - fb) * (fa - fc))
                + b * fa * fc / ((fb - fa) * (fb - fc))
                + c * fa * fb / ((fc - fa) * (fc - fb))
        } else {
            b - fb * (b - a) / (fb - fa)
        };

        let lo = (3.0 * a + b) / 4.0;
        let bisect = !((s > lo.min(b) && s < lo.max(b))
            && !(mflag && (s - b).abs() >= (b - c).abs() / 2.0)
            && !(!mflag && (s - b).abs() >= (c - d).abs() / 2.0));
        if bisect {
            s = 0.5 * (a + b);
            mflag = true;
        } else {
            mflag = false;
        }

        let fs = f(s);
        d = c;
        c = b;
        fc = fb;
        if fa * fs < 0.0 {
            b = s;
            fb = fs;
        } else {
            a = s;
            fa = fs;
        }
        if fa.abs() < fb.abs() {
            std::mem::swap(&mut a, &mut b);
            std::mem::swap(&mut fa, &mut fb);
        }
    }
    Err(RootError::NoConvergence(MAX_REFINE_ITER))
}


/**
 * Find a root of f near an initial guess, expanding the bracket outward
 * until a sign change appears. On success the refined root replaces the
 * guess, warm-starting the next call.
 */
pub fn find_root<F: FnMut(f64) -> f64>(mut f: F, guess: &mut f64) -> Result<(), RootError> {
    let mut low = 0.9 * *guess;
    let mut high = 1.1 * *guess;
    let mut flow = f(low);
    let mut fhigh = f(high);

    let mut iter = 0;
    while flow * fhigh > 0.0 {
        if flow.abs() < fhigh.abs() {
            low *= 0.8;
            flow = f(low);
        } else {
            high *= 1.2;
            fhigh = f(high);
        }
        iter += 1;
        if iter > MAX_BRACKET_ITER || (flow.abs() > 1.0e30 && fhigh.abs() > 1.0e30) {
            return Err(RootError::BracketFailed { low, high, flow, fhigh });
        }
    }

    *guess = brent(f, low, high)?;
    Ok(())
}


/**
 * Locate the global minimum of `fval` by scanning its derivative `fderiv`
 * for zero crossings over [1e-5, 10] times the current abscissa, refining
 * each crossing, and keeping the candidate with the smallest value. The
 * abscissa is updated in place for warm starts. Returns None when the scan
 * finds no crossing at all.
 */
pub fn min_from_deriv<D, F>(mut fderiv: D, mut fval: F, abscissa: &mut f64) -> Option<f64>
where
    D: FnMut(f64) -> f64,
    F: FnMut(f64) -> f64,
{
    const NSAMPLE: usize = 25;
    let a = *abscissa;
    let delta = a * (10.0 - 1.0e-5) / NSAMPLE as f64;

    let mut best: Option<(f64, f64)> = None;
    for i in 0..NSAMPLE {
        let low = 1.0e-5 * a + delta * i as f64;
        let high = low + delta;
        if fderiv(low) * fderiv(high) >= 0.0 {
            continue;
        }
        let root = match brent(&mut fderiv, low, high) {
            Ok(r) => r,
            Err(_) => continue,
        };
        if fderiv(root).abs() > RESIDUAL_TOL.max(1.0e-8 * fderiv(low).abs()) {
            continue;
        }
        let value = fval(root);
        match best {
            Some((v, _)) if v <= value => {}
            _ => best = Some((value, root)),
        }
    }

    best.map(|(value, root)| {
        *abscissa = root;
        value
    })
}


// ============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brent_finds_sqrt_two() {
        let root = brent(|x| x * x - 2.0, 1.0, 2.0).unwrap();
        assert!((root - 2.0_f64.sqrt()).abs() < 1e-10);
    }

    #[test]
    fn find_root_expands_the_bracket() {
        // root at 8, guess far below it
        let mut guess = 1.0;
        find_root(|x| x - 8.0, &mut guess).unwrap();
        assert!((guess - 8.0).abs() < 1e-9);
    }

    #[test]
    fn find_root_warm_starts_from_previous_root() {
        let mut guess = 3.0;
        find_root(|x| (x - 3.05) * (x + 40.0), &mut guess).unwrap();
        assert!((guess - 3.05).abs() < 1e-9);
    }

    #[test]
    fn min_from_deriv_picks_the_global_minimum() {
        // f(q) = (q - 2)^2 + 1 on q > 0: derivative 2(q - 2)
        let mut absc = 1.0;
        let val = min_from_deriv(|q| 2.0 * (q - 2.0), |q| (q - 2.0) * (q - 2.0) + 1.0, &mut absc)
            .unwrap();
        assert!((absc - 2.0).abs() < 1e-8);
        assert!((val - 1.0).abs() < 1e-12);
    }

    #[test]
    fn min_from_deriv_reports_absence_of_extrema() {
        let mut absc = 1.0;
        assert!(min_from_deriv(|_| 1.0, |q| q, &mut absc).is_none());
        assert!((absc - 1.0).abs() < 1e-14);
    }
}
