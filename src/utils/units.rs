//! Arc-second / metre conversions used when sizing coverage requests.

const METRES_PER_ARCSEC_LNG_AT_EQUATOR: f64 = 30.922;
const METRES_PER_ARCSEC_LAT: f64 = 30.87;

/// Arc seconds to metres at `latitude`, returned as `(longitude, latitude)` spans.
pub fn arcsec_to_metres(arcsec: f64, latitude: f64) -> (f64, f64) {
    let metres_lng = arcsec * latitude.to_radians().cos() * METRES_PER_ARCSEC_LNG_AT_EQUATOR;
    let metres_lat = arcsec * METRES_PER_ARCSEC_LAT;
    (metres_lng, metres_lat)
}

/// Metres to arc seconds at `latitude`, returned as `(longitude, latitude)` spans.
pub fn metres_to_arcsec(metres: f64, latitude: f64) -> (f64, f64) {
    let arcsec_lng = metres / latitude.to_radians().cos() / METRES_PER_ARCSEC_LNG_AT_EQUATOR;
    let arcsec_lat = metres / METRES_PER_ARCSEC_LAT;
    (arcsec_lng, arcsec_lat)
}

pub fn arcsec_to_degrees(arcsec: f64) -> f64 {
    arcsec / 3600.0
}
