/**
 * Ridders' method: the derivative of f at x from central differences of
 * decreasing stride, polynomial-extrapolated to zero stride. Returns the
 * derivative together with an error estimate, which the numerical stability
 * partials carry through to the snapshot files.
 */
pub fn ridders<F: FnMut(f64) -> f64>(mut f: F, x: f64, initial_h: f64) -> (f64, f64) {
    const NTAB: usize = 10;
    const CON: f64 = 1.4;
    const CON2: f64 = CON * CON;
    const SAFE: f64 = 2.0;

    let mut a = [[0.0f64; NTAB]; NTAB];
    let mut hh = if initial_h != 0.0 { initial_h.abs() } else { 1.0e-4 };

    a[0][0] = (f(x + hh) - f(x - hh)) / (2.0 * hh);
    let mut ans = a[0][0];
    let mut err = f64::MAX;

    for i in 1..NTAB {
        hh /= CON;
        a[0][i] = (f(x + hh) - f(x - hh)) / (2.0 * hh);
        let mut fac = CON2;
        for j in 1..=i {
            a[j][i] = (a[j - 1][i] * fac - a[j - 1][i - 1]) / (fac - 1.0);
            fac *= CON2;
            let errt = (a[j][i] - a[j - 1][i])
                .abs()
                .max((a[j][i] - a[j - 1][i - 1]).abs());
            if errt <= err {
                err = errt;
                ans = a[j][i];
            }
        }
        if (a[i][i] - a[i - 1][i - 1]).abs() >= SAFE * err {
            break;
        }
    }
    (ans, err)
}
