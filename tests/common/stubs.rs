//! Stub executables standing in for the external retrieval and transcode
//! tools, so e2e tests exercise the real child-process plumbing without
//! network access.

use std::path::{Path, PathBuf};

/// Write an executable shell script into `dir`.
pub fn write_stub(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// A retrieval stub that answers the duration probe and "downloads" by
/// copying a fixture WAV into the requested output template. When asked to
/// stream (`-o -`), it writes the fixture bytes to stdout.
pub fn retrieval_stub(dir: &Path, fixture: &Path) -> PathBuf {
    write_stub(
        dir,
        "retrieval-stub.sh",
        &format!(
            r#"#!/bin/sh
case "$*" in *"--skip-download"*) echo "95.0"; exit 0;; esac
out=""; prev=""
for a in "$@"; do
  [ "$prev" = "-o" ] && out="$a"
  prev="$a"
done
if [ "$out" = "-" ]; then
  cat "{fixture}"
  exit 0
fi
out=$(printf '%s' "$out" | sed 's/%(ext)s/wav/')
cp "{fixture}" "$out"
"#,
            fixture = fixture.display()
        ),
    )
}

/// A retrieval stub that never produces anything.
pub fn stalled_retrieval_stub(dir: &Path) -> PathBuf {
    write_stub(dir, "retrieval-stub.sh", "#!/bin/sh\nsleep 30\n")
}

/// A transcode stub that passes bytes through unchanged.
pub fn passthrough_transcode_stub(dir: &Path) -> PathBuf {
    write_stub(dir, "transcode-stub.sh", "#!/bin/sh\nexec cat\n")
}

/// Generate a one-second 440 Hz mono WAV fixture at the analyzer's rate.
pub fn write_fixture_wav(path: &Path) {
    let sample_rate = 22050u32;
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..sample_rate * 2 {
        let sample = (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate as f32).sin();
        writer.write_sample((sample * 16000.0) as i16).unwrap();
    }
    writer.finalize().unwrap();
}
