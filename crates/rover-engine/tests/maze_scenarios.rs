//! End-to-end scripted maze scenarios: a full `Simulation` driving real Lua
//! programs against small mazes, asserting through the recording host.

mod common;

use common::{door, item, open_maze, run_to_end, spawn};
use rover_core::testing::HostEvent;
use rover_core::{Direction, Lock, Position};
use tokio::task::LocalSet;

#[tokio::test(start_paused = true)]
async fn crash_is_catchable_and_keeps_position() {
    LocalSet::new()
        .run_until(async {
            let mut maze = open_maze(3, 3);
            maze.walls[0][1] = true;
            maze.initial_robots.push(spawn("karel", 0, 0, Direction::East));

            let (host, result) = run_to_end(
                maze,
                &[(
                    "main.lua",
                    r#"
                    local r = game.getRobot("karel")
                    r:setSpeed(0)
                    local ok, err = pcall(function() return r:moveForward() end)
                    local pos = r:position()
                    if not ok and tostring(err):find("bumped into") and pos.x == 0 and pos.y == 0 then
                        game.win("held position")
                    else
                        game.fail("expected a crash")
                    end
                    "#,
                )],
            )
            .await;

            result.expect("run should resolve cleanly");
            assert_eq!(host.completions(), vec![(true, "held position".to_string())]);
            assert!(host.logged("bumped into"));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn pick_up_walk_and_drop() {
    LocalSet::new()
        .run_until(async {
            let mut maze = open_maze(5, 1);
            maze.initial_robots.push(spawn("karel", 2, 0, Direction::East));
            maze.items.push(item("key-1", "Key", Some(Position::new(2, 0))));

            let (host, result) = run_to_end(
                maze,
                &[(
                    "main.lua",
                    r#"
                    local r = game.getRobot("karel")
                    r:setSpeed(0)
                    local key = r:pickUp()
                    if not key or key.id ~= "key-1" then
                        return game.fail("pickup broken")
                    end
                    if game.getItemOnPosition(2, 0) ~= nil then
                        return game.fail("item still on the floor")
                    end
                    r:moveForward()
                    r:moveForward()
                    local dropped = r:drop(key)
                    local found = game.getItemOnPosition(4, 0)
                    if dropped and dropped.position.x == 4 and found and found.id == "key-1"
                        and #r:inventory() == 0 then
                        game.win("delivered")
                    else
                        game.fail("delivery broken")
                    end
                    "#,
                )],
            )
            .await;

            result.expect("run should resolve cleanly");
            assert_eq!(host.completions(), vec![(true, "delivered".to_string())]);

            let state = host.last_robot_state("karel").expect("robot updates");
            assert_eq!(state.position, Position::new(4, 0));
            assert!(state.inventory.is_empty());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn item_locked_door_truth_table() {
    LocalSet::new()
        .run_until(async {
            let mut maze = open_maze(3, 1);
            maze.initial_robots.push(spawn("karel", 0, 0, Direction::East));
            maze.items.push(item("key-1", "Key", Some(Position::new(0, 0))));
            let mut d = door("d1", Position::new(1, 0), false);
            d.lock = Some(Lock::Items {
                required: vec!["key-1".to_string()],
            });
            maze.doors.push(d);

            let (host, result) = run_to_end(
                maze,
                &[(
                    "main.lua",
                    r#"
                    local r = game.getRobot("karel")
                    r:setSpeed(0)

                    local locked = r:openDoor()
                    if locked.ok or locked.status ~= "locked"
                        or locked.reason ~= "missing-items"
                        or locked.missing[1] ~= "key-1" then
                        return game.fail("lock did not report missing items")
                    end

                    r:pickUp()
                    local opened = r:openDoor({ id = "key-1" })
                    if not opened.ok or opened.status ~= "opened" or opened.id ~= "d1" then
                        return game.fail("door did not open with the key")
                    end

                    local again = r:openDoor({ id = "key-1" })
                    if not again.ok or again.status ~= "already-open" then
                        return game.fail("reopening should be a no-op")
                    end

                    r:moveForward()
                    local inside = r:closeDoor()
                    if inside.ok or inside.reason ~= "standing-inside" then
                        return game.fail("closing from inside should be refused")
                    end

                    r:moveForward()
                    r:turnLeft()
                    r:turnLeft()
                    local closed = r:closeDoor()
                    if closed.ok and closed.status == "closed" and not game.getDoor("d1"):isOpen() then
                        game.win("airlock cycled")
                    else
                        game.fail("door did not close behind us")
                    end
                    "#,
                )],
            )
            .await;

            result.expect("run should resolve cleanly");
            assert_eq!(host.completions(), vec![(true, "airlock cycled".to_string())]);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn scan_and_echo_report_the_corridor() {
    LocalSet::new()
        .run_until(async {
            let mut maze = open_maze(4, 1);
            maze.initial_robots.push(spawn("karel", 0, 0, Direction::East));
            maze.doors.push(door("d1", Position::new(1, 0), true));
            maze.items.push(item("gem", "Gem", Some(Position::new(2, 0))));

            let (host, result) = run_to_end(
                maze,
                &[(
                    "main.lua",
                    r#"
                    local r = game.getRobot("karel")
                    r:setSpeed(0)
                    local ahead = r:scan()
                    if not ahead or ahead.type ~= "door" or not ahead.open then
                        return game.fail("scan missed the door")
                    end
                    r:moveForward()
                    local next = r:scan()
                    if not next or next.type ~= "item" or next.id ~= "gem" then
                        return game.fail("scan missed the gem")
                    end
                    local ping = r:echo()
                    if ping.distance == 1 and ping.hit == "item" then
                        game.win("sensors nominal")
                    else
                        game.fail("echo reported " .. ping.distance .. " " .. ping.hit)
                    end
                    "#,
                )],
            )
            .await;

            result.expect("run should resolve cleanly");
            assert_eq!(host.completions(), vec![(true, "sensors nominal".to_string())]);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn item_custom_properties_survive_and_reserved_fields_refuse_writes() {
    LocalSet::new()
        .run_until(async {
            let mut maze = open_maze(3, 1);
            maze.initial_robots.push(spawn("karel", 0, 0, Direction::East));
            maze.items.push(item("gem", "Gem", Some(Position::new(2, 0))));

            let (host, result) = run_to_end(
                maze,
                &[(
                    "main.lua",
                    r#"
                    local gem = game.getItem("gem")
                    gem.weight = 3
                    gem.name = "Ruby"
                    local ok = pcall(function() gem.id = "other" end)
                    if gem.weight == 3 and gem.name == "Ruby" and not ok
                        and gem.id == "gem" then
                        game.win("properties stuck")
                    else
                        game.fail("property surface broken")
                    end
                    "#,
                )],
            )
            .await;

            result.expect("run should resolve cleanly");
            assert_eq!(host.completions(), vec![(true, "properties stuck".to_string())]);
            assert!(
                host.events()
                    .iter()
                    .any(|e| matches!(e, HostEvent::StateChanged)),
                "property writes should notify the host"
            );
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn pressure_plate_handler_wins_after_entry_returns() {
    LocalSet::new()
        .run_until(async {
            let mut maze = open_maze(3, 1);
            maze.initial_robots.push(spawn("karel", 0, 0, Direction::East));
            maze.pressure_plates.push(rover_core::PressurePlate {
                id: "p1".to_string(),
                position: Position::new(1, 0),
            });

            let (host, result) = run_to_end(
                maze,
                &[(
                    "main.lua",
                    r#"
                    game.getPressurePlate("p1"):on("enter", function(r)
                        game.win("stepped on by " .. r:name())
                    end)

                    function main()
                        local r = game.getRobot("karel")
                        r:setSpeed(0)
                        r:moveForward()
                    end
                    "#,
                )],
            )
            .await;

            result.expect("run should resolve cleanly");
            assert_eq!(
                host.completions(),
                vec![(true, "stepped on by karel".to_string())]
            );
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn dynamic_robot_creation_fires_listener_and_rejects_bad_spawns() {
    LocalSet::new()
        .run_until(async {
            let mut maze = open_maze(3, 1);
            maze.initial_robots.push(spawn("karel", 0, 0, Direction::East));

            let (host, result) = run_to_end(
                maze,
                &[(
                    "main.lua",
                    r#"
                    game.on("robotCreated", function(r)
                        if r:name() == "drone" and #game.robots() == 2
                            and r:direction() == "west" then
                            game.win("fleet of two")
                        else
                            game.fail("creation events broken")
                        end
                    end)

                    local ok = pcall(function()
                        game.createRobot({ name = "lost", x = 99, y = 0 })
                    end)
                    if ok then return game.fail("out-of-bounds spawn accepted") end

                    game.createRobot({ name = "drone", x = 2, y = 0, direction = "west" })
                    "#,
                )],
            )
            .await;

            result.expect("run should resolve cleanly");
            assert_eq!(host.completions(), vec![(true, "fleet of two".to_string())]);
        })
        .await;
}
