fn main() {
    lidar_wave_filter::cli::run();
}
