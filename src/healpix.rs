use std::f64::consts::PI;

pub fn is_valid_nside(nside: usize) -> bool {
    nside > 0 && nside.is_power_of_two()
}

pub fn nside2npix(nside: usize) -> usize {
    12 * nside * nside
}

pub fn npix2nside(npix: usize) -> Option<usize> {
    if npix % 12 != 0 {
        return None;
    }
    let nside = isqrt(npix / 12);
    if nside2npix(nside) == npix && is_valid_nside(nside) {
        Some(nside)
    } else {
        None
    }
}

pub fn nside2nring(nside: usize) -> usize {
    4 * nside - 1
}

/// Mean pixel spacing in radians.
pub fn nside2resol(nside: usize) -> f64 {
    (4.0 * PI / nside2npix(nside) as f64).sqrt()
}

pub fn nside2resol_arcmin(nside: usize) -> f64 {
    nside2resol(nside).to_degrees() * 60.0
}

fn isqrt(v: usize) -> usize {
    let mut r = (v as f64).sqrt() as usize;
    while r * r > v {
        r -= 1;
    }
    while (r + 1) * (r + 1) <= v {
        r += 1;
    }
    r
}

/// Geometry of one iso-latitude ring of the RING scheme.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RingInfo {
    pub iring: usize,
    pub z: f64,
    pub sin_theta: f64,
    pub nphi: usize,
    pub phi0: f64,
    pub first_pix: usize,
}

impl RingInfo {
    pub fn theta(&self) -> f64 {
        self.sin_theta.atan2(self.z)
    }

    pub fn phi(&self, j: usize) -> f64 {
        self.phi0 + 2.0 * PI * j as f64 / self.nphi as f64
    }

    pub fn pixels(&self) -> std::ops::Range<usize> {
        self.first_pix..self.first_pix + self.nphi
    }
}

/// `iring` is 1-based, running from the north pole.
pub fn ring_info(nside: usize, iring: usize) -> RingInfo {
    assert!(iring >= 1 && iring <= nside2nring(nside));
    let n = nside as f64;
    let npix = nside2npix(nside);
    let ncap = 2 * nside * (nside - 1);
    if iring < nside {
        let i = iring as f64;
        let tmp = i * i / (3.0 * n * n);
        RingInfo {
            iring,
            z: 1.0 - tmp,
            sin_theta: (tmp * (2.0 - tmp)).sqrt(),
            nphi: 4 * iring,
            phi0: PI / (4.0 * i),
            first_pix: 2 * iring * (iring - 1),
        }
    } else if iring <= 3 * nside {
        let z = (2.0 * n - iring as f64) * 2.0 / (3.0 * n);
        let phi0 = if (iring + nside) % 2 == 0 {
            PI / (4.0 * n)
        } else {
            0.0
        };
        RingInfo {
            iring,
            z,
            sin_theta: ((1.0 - z) * (1.0 + z)).sqrt(),
            nphi: 4 * nside,
            phi0,
            first_pix: ncap + 4 * nside * (iring - nside),
        }
    } else {
        let is = 4 * nside - iring;
        let i = is as f64;
        let tmp = i * i / (3.0 * n * n);
        RingInfo {
            iring,
            z: tmp - 1.0,
            sin_theta: (tmp * (2.0 - tmp)).sqrt(),
            nphi: 4 * is,
            phi0: PI / (4.0 * i),
            first_pix: npix - 2 * is * (is + 1),
        }
    }
}

pub fn ring2z_ring(nside: usize, iring: usize) -> f64 {
    ring_info(nside, iring).z
}

pub fn pix2ring_ring(nside: usize, ipix: usize) -> usize {
    let npix = nside2npix(nside);
    let ncap = 2 * nside * (nside - 1);
    if ipix < ncap {
        (1 + isqrt(1 + 2 * ipix)) / 2
    } else if ipix < npix - ncap {
        (ipix - ncap) / (4 * nside) + nside
    } else {
        let ip = npix - ipix;
        4 * nside - (1 + isqrt(2 * ip - 1)) / 2
    }
}

/// Returns `(theta, phi)` in radians.
pub fn pix2ang_ring(nside: usize, ipix: usize) -> (f64, f64) {
    let ring = ring_info(nside, pix2ring_ring(nside, ipix));
    (ring.theta(), ring.phi(ipix - ring.first_pix))
}

pub fn rings(nside: usize) -> impl Iterator<Item = RingInfo> {
    (1..=nside2nring(nside)).map(move |iring| ring_info(nside, iring))
}
