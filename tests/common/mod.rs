//! Common test utilities: a scripted stand-in for the engine and a small
//! fixed data set.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use vwstream_core::{Example, StreamConfig};

/// Builder for a `/bin/sh` script that speaks the engine's line protocol.
///
/// The script predicts the running mean of the targets it has seen so far
/// (0 before the first one), echoes the example tag back after the
/// prediction, writes `fake-model <count> <sum>` for `save_<path>` lines and
/// to `--final_regressor` on exit, and warm-starts from
/// `--initial_regressor` when given.
#[derive(Debug, Default, Clone)]
pub struct FakeEngine {
    reverse_pairs: bool,
    ignore_save: bool,
    die_after: Option<u64>,
    noise_every: Option<u64>,
    preamble: Vec<String>,
    never_read: bool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit predictions two at a time in swapped order.
    pub fn reverse_pairs(mut self) -> Self {
        self.reverse_pairs = true;
        self
    }

    /// Never answer `save_` directives.
    pub fn ignore_save(mut self) -> Self {
        self.ignore_save = true;
        self
    }

    /// Exit with status 1 on reading example `n`, without predicting it.
    pub fn die_after(mut self, n: u64) -> Self {
        self.die_after = Some(n);
        self
    }

    /// Print a progress line after every `n` examples.
    pub fn noise_every(mut self, n: u64) -> Self {
        self.noise_every = Some(n);
        self
    }

    /// Stay alive without ever reading input, so the pipe fills up.
    pub fn never_read(mut self) -> Self {
        self.never_read = true;
        self
    }

    /// Extra stdout line printed before any input is read.
    pub fn stdout_line(mut self, line: impl Into<String>) -> Self {
        self.preamble.push(line.into());
        self
    }

    pub fn script(&self) -> String {
        let mut script = String::from(
            r#"#!/bin/sh
set -f
final=""
initial=""
while [ $# -gt 0 ]; do
  case "$1" in
    --final_regressor) final="$2"; shift 2 ;;
    --initial_regressor) initial="$2"; shift 2 ;;
    *) shift ;;
  esac
done
n=0
sum=0
if [ -n "$initial" ] && [ -f "$initial" ]; then
  read -r _ n sum < "$initial"
fi
echo "fake engine: final_regressor = $final" >&2
echo "Num weight bits = 18"
"#,
        );

        for line in &self.preamble {
            script.push_str(&format!("echo '{}'\n", line));
        }
        if self.never_read {
            script.push_str("exec sleep 30\n");
        }

        let save = if self.ignore_save {
            ":"
        } else {
            r#"echo "fake-model $n $sum" > "$path""#
        };
        let die = match self.die_after {
            Some(limit) => format!("  if [ $((seen + 1)) -ge {} ]; then exit 1; fi\n", limit),
            None => String::new(),
        };
        let noise = match self.noise_every {
            Some(every) => format!(
                "  if [ $((seen % {})) -eq 0 ]; then echo \"average loss after $seen examples\"; fi\n",
                every
            ),
            None => String::new(),
        };
        let emit = if self.reverse_pairs {
            r#"  if [ -z "$held" ]; then
    held="$pred $tag"
  else
    echo "$pred $tag"
    echo "$held"
    held=""
  fi
"#
        } else {
            "  echo \"$pred $tag\"\n"
        };

        script.push_str(&format!(
            r#"held=""
seen=0
while IFS= read -r line; do
  case "$line" in
    save_*)
      path="${{line#save_}}"
      {save}
      continue
      ;;
  esac
{die}  set -- $line
  target="$1"
  tag=""
  for field in "$@"; do
    case "$field" in
      "'seq_"*) tag="${{field#?}}" ;;
    esac
  done
  pred=$(awk -v n="$n" -v s="$sum" 'BEGIN {{ if (n == 0) print 0; else printf "%.10g\n", s / n }}')
  sum=$(awk -v s="$sum" -v t="$target" 'BEGIN {{ printf "%.10g\n", s + t }}')
  n=$((n + 1))
  seen=$((seen + 1))
{emit}{noise}done
if [ -n "$held" ]; then echo "$held"; fi
echo "finished run"
if [ -n "$final" ]; then echo "fake-model $n $sum" > "$final"; fi
"#,
            save = save,
            die = die,
            emit = emit,
            noise = noise,
        ));

        script
    }

    /// Write the script into `dir` and make it executable.
    #[cfg(unix)]
    pub fn install(&self, dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-engine");
        std::fs::write(&path, self.script()).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}

/// A temporary directory holding an installed fake engine, plus a config
/// pointing at it with snappy snapshot polling.
pub struct FakeSetup {
    pub dir: TempDir,
    pub config: StreamConfig,
}

#[cfg(unix)]
pub fn fake_setup(engine: FakeEngine) -> FakeSetup {
    let dir = tempfile::tempdir().unwrap();
    let path = engine.install(dir.path());
    let mut config = StreamConfig::default().with_engine_path(path);
    config.snapshot.poll_interval_ms = 20;
    config.snapshot.timeout_ms = 2000;
    FakeSetup { dir, config }
}

/// Ten films: box office takings against production cost, promotion cost
/// and book sales.
pub const MOVIES: [[f64; 4]; 10] = [
    [85.09999847, 8.5, 5.099999905, 4.699999809],
    [106.3000031, 12.89999962, 5.800000191, 8.800000191],
    [50.20000076, 5.199999809, 2.099999905, 15.10000038],
    [130.6000061, 10.69999981, 8.399998665, 12.19999981],
    [54.79999924, 3.099999905, 2.900000095, 10.60000038],
    [30.29999924, 3.5, 1.200000048, 3.5],
    [79.40000153, 9.199999809, 3.700000048, 9.699999809],
    [91.0, 9.0, 7.599999905, 5.900000095],
    [135.3999939, 15.10000038, 7.699999809, 20.79999924],
    [89.30000305, 10.19999981, 4.5, 7.900000095],
];

pub fn movie_examples() -> Vec<Example> {
    MOVIES
        .iter()
        .map(|[box_office, prod, prom, book]| {
            Example::new(*box_office)
                .with_feature("prodCost", *prod)
                .with_feature("promCost", *prom)
                .with_feature("bookSales", *book)
        })
        .collect()
}
