use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;


// ============================================================================
#[derive(thiserror::Error, Debug)]
pub enum Error {

    #[error("{0}")]
    IO(#[from] std::io::Error),
}


// ============================================================================
pub fn parent_directory(path_str: &str) -> String {
    match Path::new(&path_str).parent().and_then(Path::to_str) {
        None => ".",
        Some("") => ".",
        Some(parent) => parent,
    }
    .into()
}


/**
 * Open a snapshot file for the given step: truncated on the first record,
 * appended afterwards, always buffered.
 */
pub fn open_record(path: &str, first: bool) -> Result<BufWriter<File>, Error> {
    let file = if first {
        File::create(path)?
    } else {
        OpenOptions::new().append(true).create(true).open(path)?
    };
    Ok(BufWriter::new(file))
}

/// Write a little-endian i32, the record header type of every output file
pub fn put_i32<W: Write>(w: &mut W, v: i32) -> Result<(), Error> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian f64
pub fn put_f64<W: Write>(w: &mut W, v: f64) -> Result<(), Error> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a slice of little-endian f64 values
pub fn put_f64_slice<W: Write>(w: &mut W, vs: &[f64]) -> Result<(), Error> {
    for &v in vs {
        w.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}


/**
 * Record a fatal diagnostic next to the run's other outputs. Snapshot
 * files remain valid up to the last completed step.
 */
pub fn write_stde(run_base: &str, message: &str) -> Result<(), Error> {
    let mut file = File::create(format!("{}_stde.txt", run_base))?;
    writeln!(file, "{}", message)?;
    Ok(())
}


// ============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_directory_of_a_bare_filename_is_dot() {
        assert_eq!(parent_directory("run1_radial.dat"), ".");
        assert_eq!(parent_directory("out/run1_radial.dat"), "out");
    }

    #[test]
    fn records_round_trip_as_little_endian() {
        let mut buf = Vec::new();
        put_i32(&mut buf, 46).unwrap();
        put_f64(&mut buf, 1.5).unwrap();
        put_f64_slice(&mut buf, &[0.25, -2.0]).unwrap();
        assert_eq!(buf.len(), 4 + 3 * 8);
        assert_eq!(i32::from_le_bytes(buf[0..4].try_into().unwrap()), 46);
        assert_eq!(f64::from_le_bytes(buf[4..12].try_into().unwrap()), 1.5);
        assert_eq!(f64::from_le_bytes(buf[12..20].try_into().unwrap()), 0.25);
        assert_eq!(f64::from_le_bytes(buf[20..28].try_into().unwrap()), -2.0);
    }
}
