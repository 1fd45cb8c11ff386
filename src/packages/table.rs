//! Header → pkg-config name table.

/// Exact (lowercased) header names with a known pkg-config package.
pub const KNOWN_HEADERS: &[(&str, &str)] = &[
    ("sdl2/sdl.h", "sdl2"),
    ("sdl2/sdl_image.h", "SDL2_image"),
    ("sdl2/sdl_mixer.h", "SDL2_mixer"),
    ("sdl2/sdl_ttf.h", "SDL2_ttf"),
    ("sdl2/sdl_net.h", "SDL2_net"),
    ("gtk/gtk.h", "gtk4"),
    ("gl/gl.h", "gl"),
    ("gl/glew.h", "glew"),
    ("gl/glut.h", "glu"),
    ("gl/freeglut.h", "freeglut"),
    ("glfw/glfw3.h", "glfw3"),
    ("al/al.h", "openal"),
    ("al/alc.h", "openal"),
    ("vulkan/vulkan.h", "vulkan"),
    ("x11/xlib.h", "x11"),
    ("x11/xutil.h", "x11"),
    ("libconfig.h++", "libconfig++"),
    ("libconfig.h", "libconfig"),
    ("fcgiapp.h", "fcgi"),
    ("pipewire/pipewire.h", "libpipewire-0.3"),
    ("rtaudio/rtaudio.h", "rtaudio"),
    ("raylib.h", "raylib"),
];

/// Best-guess pkg-config package for a header. `None` for Qt and Boost
/// headers, which are handled by dedicated rules.
pub fn pkg_name_from_include(inc: &str) -> Option<String> {
    let lower = inc.to_lowercase();

    if let Some((_, pkg)) = KNOWN_HEADERS.iter().find(|(h, _)| *h == lower) {
        return Some((*pkg).to_string());
    }

    if lower.starts_with("sfml/") {
        return Some(format!("sfml-{}", file_stem(inc).to_lowercase()));
    }

    if lower.starts_with("sdl2/sdl_") {
        return Some(sdl2_sublib(inc));
    }

    if lower.starts_with("glm/") {
        return Some("glm".to_string());
    }

    if inc.starts_with('Q') || lower.starts_with("boost/") {
        return None;
    }

    inc.split_once('/').map(|(first, _)| first.to_string())
}

/// `SDL2/SDL_image.h` → `SDL2_image`
pub fn sdl2_sublib(inc: &str) -> String {
    let rest = inc.get("sdl2/sdl_".len()..).unwrap_or_default();
    let word = format!("SDL2_{}", rest);
    match word.rfind('.') {
        Some(dot) => word[..dot].to_string(),
        None => word,
    }
}

fn file_stem(inc: &str) -> &str {
    let base = inc.rsplit('/').next().unwrap_or(inc);
    base.rsplit_once('.').map_or(base, |(stem, _)| stem)
}
