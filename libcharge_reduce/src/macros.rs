//! Builders for the text artifacts that drive iterative simulation runs:
//! Geant4-style control macros and SLURM submission scripts.
//!
//! Both are pure renderers from a fixed configuration struct to a string;
//! writing the result anywhere is the caller's business. Rendering is fully
//! deterministic so generated files diff cleanly between campaigns.

use std::fmt::Write;

/// One general-particle-source block of a control macro.
#[derive(Debug, Clone)]
pub struct GpsSource {
    pub particle: String,
    /// Energy with unit, e.g. `120 eV`
    pub energy: String,
    /// Relative source intensity; only meaningful past the first source
    pub intensity: Option<f64>,
    /// Half extents of the square plane source, micrometers
    pub half_x_um: f64,
    pub half_y_um: f64,
    /// Plane center, micrometers
    pub centre_um: [f64; 3],
    pub direction: [f64; 3],
}

impl GpsSource {
    fn render(&self, out: &mut String, first: bool) {
        if !first {
            out.push_str("/gps/source/add 1\n");
            if let Some(intensity) = self.intensity {
                let _ = writeln!(out, "/gps/source/intensity {intensity}");
            }
        }
        let _ = writeln!(out, "/gps/particle {}", self.particle);
        out.push_str("/gps/ene/type Mono\n");
        let _ = writeln!(out, "/gps/energy {}", self.energy);
        out.push_str("/gps/pos/type Plane\n");
        out.push_str("/gps/pos/shape Square\n");
        let _ = writeln!(out, "/gps/pos/halfx {} um", self.half_x_um);
        let _ = writeln!(out, "/gps/pos/halfy {} um", self.half_y_um);
        let _ = writeln!(
            out,
            "/gps/pos/centre {} {} {} um",
            self.centre_um[0], self.centre_um[1], self.centre_um[2]
        );
        let _ = writeln!(
            out,
            "/gps/direction {} {} {}",
            self.direction[0], self.direction[1], self.direction[2]
        );
        out.push_str("/gps/ang/type planar\n");
    }
}

/// Parameters of one iteration's control macro.
#[derive(Debug, Clone)]
pub struct MacroConfig {
    /// Stem of the ROOT output file, without extension
    pub output_stem: String,
    pub seeds: [i64; 2],
    /// Events to generate with `/run/beamOn`
    pub events: u64,
    /// Relative permittivity of the target material
    pub epsilon: f64,
    pub periodic: bool,
    /// ROOT files of the previous iteration feeding the charge state
    pub input_files: Vec<String>,
    pub sources: Vec<GpsSource>,
    pub print_progress: u64,
}

impl Default for MacroConfig {
    fn default() -> Self {
        Self {
            output_stem: String::from("00_iteration0"),
            seeds: [10008859, 10005380],
            events: 100_000,
            epsilon: 3.9,
            periodic: false,
            input_files: Vec::new(),
            sources: vec![
                GpsSource {
                    particle: String::from("e-"),
                    energy: String::from("120 eV"),
                    intensity: None,
                    half_x_um: 50.0,
                    half_y_um: 50.0,
                    centre_um: [0.0, 0.0, 60.0],
                    direction: [0.0, 0.0, -1.0],
                },
                GpsSource {
                    particle: String::from("gamma"),
                    energy: String::from(".2 meV"),
                    intensity: Some(1.5),
                    half_x_um: 50.0,
                    half_y_um: 50.0,
                    centre_um: [0.0, 0.0, 60.0],
                    direction: [0.0, 0.0, -1.0],
                },
            ],
            print_progress: 10_000,
        }
    }
}

impl MacroConfig {
    /// Render the full control macro.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Macro file for {}", self.output_stem);
        out.push_str("#\n");
        out.push_str("/control/verbose 0\n");
        out.push_str("/run/verbose 1\n");
        out.push_str("/event/verbose 0\n");
        out.push_str("/tracking/verbose 0\n");
        out.push_str("/process/verbose 0\n");
        out.push_str("#\n");
        let _ = writeln!(out, "/random/setSeeds {} {}", self.seeds[0], self.seeds[1]);
        out.push_str("/random/setSavingFlag 1\n");
        out.push_str("#\n");
        if !self.input_files.is_empty() {
            let _ = writeln!(
                out,
                "/sphere/rootinput/file {}",
                self.input_files.join(" ")
            );
        }
        let _ = writeln!(out, "/sphere/filename root/{}.root", self.output_stem);
        let _ = writeln!(out, "/sphere/epsilon {}", self.epsilon);
        let _ = writeln!(out, "/sphere/PBC {}", self.periodic);
        out.push_str("#\n");
        out.push_str("/run/initialize\n");
        out.push_str("#\n");
        for (idx, source) in self.sources.iter().enumerate() {
            source.render(&mut out, idx == 0);
            out.push_str("#\n");
        }
        let _ = writeln!(out, "/run/printProgress {}", self.print_progress);
        let _ = writeln!(out, "/run/beamOn {}", self.events);
        out
    }
}

/// Parameters of a SLURM batch script running one iteration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub job_name: String,
    pub account: String,
    pub nodes: u32,
    pub mem_per_cpu: String,
    pub time_limit: String,
    pub log_path: String,
    /// Shell commands the job runs, in order
    pub commands: Vec<String>,
}

impl BatchConfig {
    /// Render the submission script.
    pub fn render(&self) -> String {
        let mut out = String::from("#!/bin/bash\n");
        let _ = writeln!(out, "#SBATCH --job-name={}", self.job_name);
        let _ = writeln!(out, "#SBATCH --account={}", self.account);
        let _ = writeln!(out, "#SBATCH --nodes={}", self.nodes);
        let _ = writeln!(out, "#SBATCH --mem-per-cpu={}", self.mem_per_cpu);
        let _ = writeln!(out, "#SBATCH --time={}", self.time_limit);
        let _ = writeln!(out, "#SBATCH --output={}", self.log_path);
        out.push('\n');
        for command in &self.commands {
            out.push_str(command);
            out.push('\n');
        }
        out
    }

    /// The sbatch line submitting this script once `dependency_job` ends
    /// successfully. Chains iteration N+1 behind iteration N.
    pub fn submit_command(&self, script_path: &str, dependency_job: Option<&str>) -> String {
        match dependency_job {
            Some(job) => format!("sbatch --dependency=afterok:{job} {script_path}"),
            None => format!("sbatch {script_path}"),
        }
    }
}
