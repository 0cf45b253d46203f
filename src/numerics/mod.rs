pub mod bessel;
pub mod brent;
pub mod deriv;
pub mod spline;
pub mod tridiag;
