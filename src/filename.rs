//! File names for split output.
//!
//! A template may hold `%s` (run type), `$(VAR)` (environment value, empty if
//! unset) and up to two C-style integer specifiers such as `%d`, `%5x` or
//! `%03d`.  The first integer specifier takes the run number and the
//! second the split number.

use regex::{Captures, Regex};

use crate::error::{EvioError, Result};

const ENV_PATTERN: &str = r"\$\((.*?)\)";
const INT_PATTERN: &str = r"%(\d*)([xd])";

fn pattern(re: &str) -> Result<Regex> {
    Regex::new(re).map_err(|e| EvioError::format(format!("file name pattern: {}", e)))
}

/// A template after `%s` / environment substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseFileName {
    pub name:            String,
    pub specifier_count: usize,
}

/// Substitute run type and environment variables, and zero-pad integer
/// specifier widths.  More than two integer specifiers is an error.
pub fn generate_base_file_name(template: &str, run_type: Option<&str>) -> Result<BaseFileName> {
    generate_base_file_name_with(template, run_type, |var| std::env::var(var).ok())
}

/// Same as [`generate_base_file_name`] with a custom environment lookup.
pub fn generate_base_file_name_with<F>(template: &str, run_type: Option<&str>, env: F) -> Result<BaseFileName>
where
    F: Fn(&str) -> Option<String>,
{
    let name = template.replace("%s", run_type.unwrap_or(""));

    let name = if name.contains("$(") {
        pattern(ENV_PATTERN)?
            .replace_all(&name, |caps: &Captures| env(&caps[1]).unwrap_or_default())
            .into_owned()
    } else {
        name
    };

    let ints = pattern(INT_PATTERN)?;
    let specifier_count = ints.find_iter(&name).count();
    if specifier_count > 2 {
        return Err(EvioError::format(format!(
            "file name template has {} integer specifiers, at most 2 allowed", specifier_count
        )));
    }
    let name = ints
        .replace_all(&name, |caps: &Captures| {
            let width = &caps[1];
            if !width.is_empty() && !width.starts_with('0') {
                format!("%0{}{}", width, &caps[2])
            } else {
                caps[0].to_string()
            }
        })
        .into_owned();

    Ok(BaseFileName { name, specifier_count })
}

/// Render one integer specifier (`%d`, `%05x`, ...).
fn render(width: &str, conv: &str, value: u64) -> String {
    let width: usize = width.parse().unwrap_or(0);
    match conv {
        "x" => format!("{:0width$x}", value, width = width),
        _   => format!("{:0width$}", value, width = width),
    }
}

/// Fill the first `values.len()` integer specifiers of `name`.
fn fill(name: &str, values: &[u64]) -> Result<String> {
    let ints = pattern(INT_PATTERN)?;
    let mut next = values.iter();
    Ok(ints
        .replace_all(name, |caps: &Captures| match next.next() {
            Some(v) => render(&caps[1], &caps[2], *v),
            None    => caps[0].to_string(),
        })
        .into_owned())
}

/// Produce the final name for one output file.  `split` is the split size
/// in bytes; 0 means the output is not split.
pub fn generate_file_name(base: &BaseFileName, run_number: u32, split: u64, split_number: u32) -> Result<String> {
    let run = run_number as u64;
    let part = split_number as u64;
    if split > 0 {
        return Ok(match base.specifier_count {
            0 => format!("{}.{}", base.name, split_number),
            1 => format!("{}.{}", fill(&base.name, &[run])?, split_number),
            _ => fill(&base.name, &[run, part])?,
        });
    }
    match base.specifier_count {
        0 => Ok(base.name.clone()),
        1 => fill(&base.name, &[run]),
        _ => {
            // drop the split specifier, then fill the run number
            let ints = pattern(INT_PATTERN)?;
            let mut seen = 0;
            let trimmed = ints
                .replace_all(&base.name, |caps: &Captures| {
                    seen += 1;
                    if seen == 2 { String::new() } else { caps[0].to_string() }
                })
                .into_owned();
            fill(&trimmed, &[run])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn run_type_and_environment() {
        let env = |v: &str| (v == "DIR").then(|| "/data".to_string());
        let b = generate_base_file_name_with("$(DIR)/%s_$(NOPE)run", Some("cosmic"), env).unwrap();
        assert_eq!(b.name, "/data/cosmic_run");
        assert_eq!(b.specifier_count, 0);
        let b = generate_base_file_name_with("x%sy", None, no_env).unwrap();
        assert_eq!(b.name, "xy");
    }

    #[test]
    fn widths_get_zero_padded() {
        let b = generate_base_file_name_with("run%5d_%x.evio", None, no_env).unwrap();
        assert_eq!(b.name, "run%05d_%x.evio");
        assert_eq!(b.specifier_count, 2);
        assert!(generate_base_file_name_with("%d%d%d", None, no_env).is_err());
    }

    #[test]
    fn split_names() {
        let b0 = generate_base_file_name_with("file", None, no_env).unwrap();
        assert_eq!(generate_file_name(&b0, 7, 100, 3).unwrap(), "file.3");
        assert_eq!(generate_file_name(&b0, 7, 0, 3).unwrap(), "file");

        let b1 = generate_base_file_name_with("run_%4d.evio", None, no_env).unwrap();
        assert_eq!(generate_file_name(&b1, 42, 100, 1).unwrap(), "run_0042.evio.1");
        assert_eq!(generate_file_name(&b1, 42, 0, 1).unwrap(), "run_0042.evio");

        let b2 = generate_base_file_name_with("r%d_%03x", None, no_env).unwrap();
        assert_eq!(generate_file_name(&b2, 5, 100, 26).unwrap(), "r5_01a");
        assert_eq!(generate_file_name(&b2, 5, 0, 26).unwrap(), "r5_");
    }
}
