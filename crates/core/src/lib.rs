pub mod capture;
pub mod detection;
pub mod enrollment;
pub mod gallery;
pub mod recognition;
pub mod shared;

#[cfg(test)]
mod testing;
