use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use xwalk_rs::{
    ColumnSpec, ConfigBuilder, LinkageConfig, LinkageError, MatchDecisions, Matcher,
    MatcherRequest, SourceFile,
};

/// One synthetic person shared across roster files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    pub fname: String,
    pub lname: String,
    pub birth_year: u32,
    pub birth_month: u32,
    pub birth_day: u32,
}

const FIRST_NAMES: [&str; 12] = [
    "ann", "bob", "carol", "dan", "erin", "frank", "gail", "hugo", "iris", "jon", "kate", "liam",
];
const LAST_NAMES: [&str; 12] = [
    "adler", "brown", "chen", "durand", "evans", "fischer", "garcia", "haas", "ito", "jones",
    "kim", "lopez",
];

/// Deterministic synthetic population. Names are drawn from small pools so
/// distinct people can share a name, the way real rosters do.
#[allow(dead_code)]
pub fn generate_people(count: usize, seed: u64) -> Vec<Person> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| Person {
            fname: FIRST_NAMES[rng.random_range(0..FIRST_NAMES.len())].to_string(),
            lname: LAST_NAMES[rng.random_range(0..LAST_NAMES.len())].to_string(),
            birth_year: rng.random_range(1940..2005),
            birth_month: rng.random_range(1..=12),
            birth_day: rng.random_range(1..=28),
        })
        .collect()
}

/// Roster A: `uid,fname,lname,by,bm,bd`, uids `A0000..`.
#[allow(dead_code)]
pub fn write_roster_a(dir: &Path, people: &[Person]) -> PathBuf {
    let path = dir.join("roster_a.csv");
    let mut out = File::create(&path).expect("create roster a");
    writeln!(out, "uid,fname,lname,by,bm,bd").expect("write header");
    for (i, p) in people.iter().enumerate() {
        writeln!(
            out,
            "A{:04},{},{},{},{},{}",
            i, p.fname, p.lname, p.birth_year, p.birth_month, p.birth_day
        )
        .expect("write row");
    }
    path
}

/// Roster B: `id,year,month,day,first,last`, uids `B0000..`. Same people,
/// different header names and column order.
#[allow(dead_code)]
pub fn write_roster_b(dir: &Path, people: &[Person]) -> PathBuf {
    let path = dir.join("roster_b.csv");
    let mut out = File::create(&path).expect("create roster b");
    writeln!(out, "id,year,month,day,first,last").expect("write header");
    for (i, p) in people.iter().enumerate() {
        writeln!(
            out,
            "B{:04},{},{},{},{},{}",
            i, p.birth_year, p.birth_month, p.birth_day, p.fname, p.lname
        )
        .expect("write row");
    }
    path
}

/// Roster C: `given,surname,yr,mo,dy,pid`, uids `C0000..`.
#[allow(dead_code)]
pub fn write_roster_c(dir: &Path, people: &[Person]) -> PathBuf {
    let path = dir.join("roster_c.csv");
    let mut out = File::create(&path).expect("create roster c");
    writeln!(out, "given,surname,yr,mo,dy,pid").expect("write header");
    for (i, p) in people.iter().enumerate() {
        writeln!(
            out,
            "{},{},{},{},{},C{:04}",
            p.fname, p.lname, p.birth_year, p.birth_month, p.birth_day, i
        )
        .expect("write row");
    }
    path
}

/// Configuration matching the roster writers above, for two or three files
/// in A, B, C order.
#[allow(dead_code)]
pub fn roster_config(paths: &[PathBuf]) -> LinkageConfig {
    assert!(
        (2..=3).contains(&paths.len()),
        "roster_config takes 2 or 3 files"
    );
    let tail = paths.len() - 1;
    let alias = move |names: [&str; 2]| -> Vec<String> {
        names[..tail].iter().map(|n| n.to_string()).collect()
    };

    let uid_columns = ["uid", "id", "pid"];
    let mut builder = ConfigBuilder::new();
    for (path, uid) in paths.iter().zip(uid_columns) {
        builder = builder.source(SourceFile::new(path).with_uid_column(uid));
    }
    builder
        .column(ColumnSpec::string("fname"))
        .column(ColumnSpec::string("lname"))
        .column(ColumnSpec::categorical("by"))
        .column(ColumnSpec::categorical("bm"))
        .column(ColumnSpec::categorical("bd"))
        .map_column("fname", alias(["first", "given"]))
        .map_column("lname", alias(["last", "surname"]))
        .map_column("by", alias(["year", "yr"]))
        .map_column("bm", alias(["month", "mo"]))
        .map_column("bd", alias(["day", "dy"]))
        .build()
        .unwrap()
}

/// Matcher stub that returns canned decisions and records the request it
/// was handed.
#[derive(Debug)]
pub struct StubMatcher {
    decisions: MatchDecisions,
    pub last_request: Mutex<Option<MatcherRequest>>,
}

#[allow(dead_code)]
impl StubMatcher {
    pub fn new(decisions: MatchDecisions) -> Self {
        Self {
            decisions,
            last_request: Mutex::new(None),
        }
    }

    pub fn request(&self) -> Option<MatcherRequest> {
        self.last_request.lock().expect("request lock").clone()
    }
}

impl Matcher for StubMatcher {
    fn run(&self, request: &MatcherRequest) -> Result<MatchDecisions, LinkageError> {
        *self.last_request.lock().expect("request lock") = Some(request.clone());
        Ok(self.decisions.clone())
    }
}

/// Matcher stub that always fails as if the engine were not installed.
#[derive(Debug, Clone, Default)]
pub struct FailingMatcher;

impl Matcher for FailingMatcher {
    fn run(&self, _request: &MatcherRequest) -> Result<MatchDecisions, LinkageError> {
        Err(LinkageError::MatcherUnavailable {
            message: "matching engine not installed".to_string(),
        })
    }
}
