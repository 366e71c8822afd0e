use std::env;
use std::path::{Path, PathBuf};

/// Name of the transcoder executable the normalize stage runs.
fn ffmpeg_executable(target_os: &str) -> &'static str {
    if target_os == "windows" { "ffmpeg.exe" } else { "ffmpeg" }
}

fn on_path(executable: &str) -> bool {
    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|directory| directory.join(executable).is_file()))
        .unwrap_or(false)
}

fn main() {
    println!("cargo:rerun-if-env-changed=FFMPEG_DIR");
    println!("cargo:rerun-if-env-changed=VCPKG_ROOT");
    println!("cargo:rerun-if-env-changed=VCPKGRS_TRIPLET");
    println!("cargo:rerun-if-env-changed=PATH");

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let executable = ffmpeg_executable(&target_os);
    let ffmpeg_dir = env::var_os("FFMPEG_DIR").map(PathBuf::from);

    let bundled = ffmpeg_dir
        .as_deref()
        .is_some_and(|directory| directory.join("bin").join(executable).is_file());
    if !bundled && !on_path(executable) {
        println!(
            "cargo:warning=`{executable}` was not found on PATH. Decoding works, but the normalize stage needs the executable at runtime."
        );
    }

    if target_os != "windows" || ffmpeg_dir.is_some() {
        return;
    }

    match env::var("VCPKG_ROOT") {
        Ok(vcpkg_root) => {
            let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
            let installed = Path::new(&vcpkg_root).join("installed").join(&triplet);
            if installed.exists() {
                println!(
                    "cargo:warning=Detected vcpkg FFmpeg at {}. Set FFMPEG_DIR to it for reliable library discovery.",
                    installed.display()
                );
            } else {
                println!(
                    "cargo:warning=VCPKG_ROOT is set but no FFmpeg install was found at {}.",
                    installed.display()
                );
            }
        }
        Err(_) => println!(
            "cargo:warning=FFMPEG_DIR is not set. On Windows, install FFmpeg via vcpkg and set FFMPEG_DIR."
        ),
    }
}
