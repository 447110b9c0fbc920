use super::Instance;
use crate::config::{Algorithm, OutputFormat, RunSettings};
use crate::error::{CalError, CalResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Drops the comment part of a line and surrounding whitespace.
fn clean(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
    .trim()
}

fn first_token<'a>(line_no: usize, key: char, text: &'a str) -> CalResult<&'a str> {
    text.split_whitespace()
        .next()
        .ok_or_else(|| CalError::parse(line_no, format!("missing value for '{}'", key)))
}

fn parse_value<T: FromStr>(line_no: usize, key: char, text: &str) -> CalResult<T> {
    let token = first_token(line_no, key, text)?;
    token
        .parse()
        .map_err(|_| CalError::parse(line_no, format!("invalid value '{}' for '{}'", token, key)))
}

/// Negative values mean "no limit" in the file format.
fn optional_count(line_no: usize, key: char, text: &str) -> CalResult<Option<u64>> {
    let v: i64 = parse_value(line_no, key, text)?;
    Ok((v >= 0).then_some(v as u64))
}

fn optional_real(line_no: usize, key: char, text: &str) -> CalResult<Option<f64>> {
    let v: f64 = parse_value(line_no, key, text)?;
    Ok((v >= 0.0).then_some(v))
}

/// Gathers `needed` whitespace separated tokens, starting with what is left
/// on the key line and continuing on the following lines.
fn collect_tokens<'a, I>(
    first: &'a str,
    lines: &mut I,
    needed: usize,
    key: char,
    line_no: usize,
) -> CalResult<Vec<&'a str>>
where
    I: Iterator<Item = (usize, &'a str)>,
{
    let mut tokens: Vec<&str> = first.split_whitespace().collect();
    while tokens.len() < needed {
        match lines.next() {
            Some((_, line)) => tokens.extend(line.split_whitespace()),
            None => {
                return Err(CalError::parse(
                    line_no,
                    format!(
                        "not enough data in '{}' lines (read {}, need {})",
                        key,
                        tokens.len(),
                        needed
                    ),
                ))
            }
        }
    }
    tokens.truncate(needed);
    Ok(tokens)
}

fn parse_reals(tokens: &[&str], key: char, line_no: usize) -> CalResult<Vec<f64>> {
    tokens
        .iter()
        .map(|t| {
            t.parse::<f64>().map_err(|_| {
                CalError::parse(line_no, format!("invalid number '{}' in '{}' data", t, key))
            })
        })
        .collect()
}

pub fn load_instance<P: AsRef<Path>>(path: P) -> CalResult<Instance> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        CalError::Instance(format!("could not open file {}: {}", path.display(), e))
    })?;
    parse_instance(&path.display().to_string(), &content)
}

/// Parses the line-keyed instance format. The first character of each
/// line selects the field; `y`, `I` and `x` data may spill onto the
/// following lines.
pub fn parse_instance(name: &str, content: &str) -> CalResult<Instance> {
    let mut lines = content
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, clean(l)));

    let mut population: Option<usize> = None;
    let mut sample_size: Option<usize> = None;
    let mut n_calibration: Option<usize> = None;
    let mut calibration: Option<Vec<f64>> = None;
    let mut initial: Option<Vec<f64>> = None;
    let mut ids: Option<Vec<String>> = None;
    let mut settings = RunSettings::default();

    while let Some((line_no, line)) = lines.next() {
        let mut chars = line.chars();
        let Some(key) = chars.next() else {
            continue;
        };
        let rest = chars.as_str();

        match key {
            'N' => population = Some(parse_value(line_no, key, rest)?),
            'n' => sample_size = Some(parse_value(line_no, key, rest)?),
            'p' => n_calibration = Some(parse_value(line_no, key, rest)?),
            'e' => settings.epsilon = optional_real(line_no, key, rest)?,
            'i' => settings.lp_iterations = optional_count(line_no, key, rest)?,
            'k' => {
                let v: i64 = parse_value(line_no, key, rest)?;
                settings.rounds = v.max(0) as usize;
            }
            'b' => settings.node_limit = optional_count(line_no, key, rest)?,
            't' => settings.time_limit = optional_real(line_no, key, rest)?,
            'T' => settings.total_time_limit = optional_real(line_no, key, rest)?,
            'R' => {
                let v: i64 = parse_value(line_no, key, rest)?;
                settings.replications = v.max(0) as usize;
            }
            's' => settings.seed = optional_count(line_no, key, rest)?,
            'f' => settings.early_stop = optional_real(line_no, key, rest)?,
            'o' => settings.output = Some(PathBuf::from(first_token(line_no, key, rest)?)),
            'O' => {
                settings.out_format = match first_token(line_no, key, rest)? {
                    "block" => OutputFormat::Block,
                    _ => OutputFormat::Row,
                }
            }
            'a' => {
                let name = first_token(line_no, key, rest)?;
                settings.algorithm = name.parse::<Algorithm>().map_err(|_| {
                    CalError::parse(
                        line_no,
                        format!(
                            "algorithm \"{}\" not recognized. Must be one of {}",
                            name,
                            Algorithm::choices()
                        ),
                    )
                })?;
            }
            'y' | 'I' | 'x' => {
                let (n, p) = match (population, n_calibration) {
                    (Some(n), Some(p)) => (n, p),
                    _ => {
                        return Err(CalError::parse(
                            line_no,
                            "please define N and p before adding any data",
                        ))
                    }
                };
                let needed = if key == 'x' { n * p } else { n };
                let tokens = collect_tokens(rest, &mut lines, needed, key, line_no)?;
                match key {
                    'I' => ids = Some(tokens.iter().map(|t| t.to_string()).collect()),
                    'y' => initial = Some(parse_reals(&tokens, key, line_no)?),
                    _ => calibration = Some(parse_reals(&tokens, key, line_no)?),
                }
            }
            c if c.is_ascii_alphanumeric() => {
                return Err(CalError::parse(
                    line_no,
                    format!("option '{}' not recognized", c),
                ))
            }
            _ => {}
        }
    }

    let population =
        population.ok_or_else(|| CalError::Instance("missing population size 'N'".into()))?;
    let sample_size =
        sample_size.ok_or_else(|| CalError::Instance("missing sample size 'n'".into()))?;
    let n_calibration = n_calibration
        .ok_or_else(|| CalError::Instance("missing number of calibration vectors 'p'".into()))?;
    let calibration = match calibration {
        Some(x) => x,
        None if n_calibration == 0 => Vec::new(),
        None => {
            return Err(CalError::Instance(
                "missing calibration data 'x'".into(),
            ))
        }
    };

    let instance = Instance {
        name: name.to_string(),
        population,
        sample_size,
        n_calibration,
        calibration,
        initial,
        ids,
        settings,
    };
    instance.validate()?;

    debug!(
        "Parsed instance {}: N={} n={} p={}",
        instance.name, instance.population, instance.sample_size, instance.n_calibration
    );
    Ok(instance)
}
