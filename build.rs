use std::{env, path::PathBuf};

const WATCHED_VARIABLES: [&str; 4] = ["FFMPEG_DIR", "VCPKG_ROOT", "VCPKGRS_DYNAMIC", "VCPKGRS_TRIPLET"];

/// Where a vcpkg install of FFmpeg would live for the configured triplet.
fn vcpkg_ffmpeg_dir(vcpkg_root: &str) -> PathBuf {
    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    PathBuf::from(vcpkg_root).join("installed").join(triplet)
}

fn main() {
    for variable in WATCHED_VARIABLES {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    // pkg-config finds FFmpeg everywhere except Windows.
    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("windows") || env::var_os("FFMPEG_DIR").is_some() {
        return;
    }

    let Ok(vcpkg_root) = env::var("VCPKG_ROOT") else {
        println!(
            "cargo:warning=framestep needs FFmpeg development libraries; set FFMPEG_DIR (or VCPKG_ROOT with FFmpeg installed through vcpkg)."
        );
        return;
    };

    let ffmpeg_dir = vcpkg_ffmpeg_dir(&vcpkg_root);
    if !ffmpeg_dir.exists() {
        println!(
            "cargo:warning=No vcpkg FFmpeg install under {}; set FFMPEG_DIR to your FFmpeg prefix.",
            ffmpeg_dir.display()
        );
        return;
    }

    println!(
        "cargo:warning=Using vcpkg FFmpeg at {0}. Set FFMPEG_DIR={0} to silence this warning.",
        ffmpeg_dir.display()
    );
    if env::var_os("VCPKGRS_DYNAMIC").is_none() {
        println!("cargo:warning=Set VCPKGRS_DYNAMIC=1 if FFmpeg was installed as a dynamic vcpkg build.");
    }
}
